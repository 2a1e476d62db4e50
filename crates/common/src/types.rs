//! Core types for testdeck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of a discovered test file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
    Visual,
    Accessibility,
    Performance,
    Security,
    Smoke,
    Other,
}

impl TestType {
    /// Every known type, `Other` last
    pub const ALL: [TestType; 9] = [
        TestType::Unit,
        TestType::Integration,
        TestType::E2e,
        TestType::Visual,
        TestType::Accessibility,
        TestType::Performance,
        TestType::Security,
        TestType::Smoke,
        TestType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Unit => "unit",
            TestType::Integration => "integration",
            TestType::E2e => "e2e",
            TestType::Visual => "visual",
            TestType::Accessibility => "accessibility",
            TestType::Performance => "performance",
            TestType::Security => "security",
            TestType::Smoke => "smoke",
            TestType::Other => "other",
        }
    }

    /// Parse a type name, case-insensitive
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl Default for TestType {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test file found by a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    pub id: String,
    pub name: String,
    /// Relative to the scanned root, `/` separated
    pub path: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub category: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Group descriptors by category, keeping scan order within each group
pub fn group_by_category(tests: &[TestDescriptor]) -> BTreeMap<String, Vec<TestDescriptor>> {
    let mut groups: BTreeMap<String, Vec<TestDescriptor>> = BTreeMap::new();
    for test in tests {
        groups
            .entry(test.category.clone())
            .or_default()
            .push(test.clone());
    }
    groups
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Error,
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Passed => write!(f, "passed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Exit code recorded when the process was killed or never reported one
pub const KILLED_EXIT_CODE: i32 = -1;

/// Outcome of executing one test
///
/// Built only through [`RunResult::completed`] and [`RunResult::aborted`] so
/// that `success` always equals `exit_code == 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub test_path: String,
    pub success: bool,
    pub output: String,
    pub error_output: String,
    pub parsed_results: Option<serde_json::Value>,
    pub exit_code: i32,
    #[serde(default)]
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Id of the stored run log, once one has been written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl RunResult {
    pub fn completed(
        test_path: impl Into<String>,
        exit_code: i32,
        output: String,
        error_output: String,
        parsed_results: Option<serde_json::Value>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            test_path: test_path.into(),
            success: exit_code == 0,
            output,
            error_output,
            parsed_results,
            exit_code,
            aborted: false,
            started_at,
            duration_ms: elapsed_ms(started_at),
            run_id: None,
        }
    }

    pub fn aborted(
        test_path: impl Into<String>,
        output: String,
        mut error_output: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        if !error_output.is_empty() && !error_output.ends_with('\n') {
            error_output.push('\n');
        }
        error_output.push_str("Test run aborted by client");
        Self {
            test_path: test_path.into(),
            success: false,
            output,
            error_output,
            parsed_results: None,
            exit_code: KILLED_EXIT_CODE,
            aborted: true,
            started_at,
            duration_ms: elapsed_ms(started_at),
            run_id: None,
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Aborted
        } else if self.success {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        }
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    (Utc::now() - started_at).num_milliseconds().max(0) as u64
}

/// One client-reported interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Events accumulated for one browser session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub events: Vec<BehaviorEvent>,
}

impl BehaviorSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            started_at: now,
            last_event_at: now,
            ended_at: None,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, events: impl IntoIterator<Item = BehaviorEvent>) {
        self.events.extend(events);
        self.last_event_at = Utc::now();
    }

    /// Mark the session ended; the first unload wins
    pub fn end(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}
