//! axe-core audits of a single screen

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{RunnerError, RunnerResult};
use crate::playwright::{PageScript, ScriptRunner, Viewport};
use crate::report::{ReportDir, ReportFile};

const AXE_REQUIRE: &str = "const { AxeBuilder } = require('@axe-core/playwright');";

const AXE_BODY: &str = r#"const axe = await new AxeBuilder({ page }).analyze();
result = {
  url: axe.url,
  timestamp: axe.timestamp,
  violations: axe.violations,
  passes: axe.passes.length,
  incomplete: axe.incomplete.length,
  inapplicable: axe.inapplicable.length
};"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityRequest {
    pub screen_name: String,
    pub url: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityReport {
    pub screen_name: String,
    pub url: String,
    pub viewport: Viewport,
    pub violation_count: usize,
    /// Raw axe output as reported by the script
    pub results: serde_json::Value,
    pub tested_at: DateTime<Utc>,
    pub result_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AccessibilityRunner {
    scripts: ScriptRunner,
    reports: ReportDir,
}

impl AccessibilityRunner {
    /// `results_dir` is the shared results root; reports go to `accessibility/`
    pub fn new(scripts: ScriptRunner, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts,
            reports: ReportDir::new(results_dir.into().join("accessibility")),
        }
    }

    pub fn script(request: &AccessibilityRequest) -> String {
        PageScript::new(&request.url)
            .viewport(request.viewport.unwrap_or_default())
            .require(AXE_REQUIRE)
            .body(AXE_BODY)
            .build()
    }

    pub async fn run(
        &self,
        request: AccessibilityRequest,
        cancel: CancellationToken,
    ) -> RunnerResult<AccessibilityReport> {
        if request.screen_name.trim().is_empty() || request.url.trim().is_empty() {
            return Err(RunnerError::InvalidRequest(
                "screenName and url are required".to_string(),
            ));
        }

        info!("Accessibility audit of {} ({})", request.screen_name, request.url);
        let label = format!("accessibility:{}", request.screen_name);
        let results = self.scripts.run(&label, &Self::script(&request), cancel).await?;

        if results["success"] == serde_json::Value::Bool(false) {
            let message = results["error"].as_str().unwrap_or("axe audit failed");
            return Err(RunnerError::Playwright(message.to_string()));
        }

        let mut report = AccessibilityReport {
            violation_count: results["violations"].as_array().map(Vec::len).unwrap_or(0),
            screen_name: request.screen_name,
            url: request.url,
            viewport: request.viewport.unwrap_or_default(),
            results,
            tested_at: Utc::now(),
            result_file: None,
        };
        let path = self.reports.next_path(&report.screen_name);
        report.result_file = Some(path.clone());
        self.reports.save(&path, &report)?;
        Ok(report)
    }

    pub fn results(&self) -> Vec<ReportFile> {
        self.reports.list()
    }

    pub fn read_result(&self, file: &str) -> RunnerResult<serde_json::Value> {
        self.reports.read(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request: AccessibilityRequest = serde_json::from_str(
            r#"{"screenName":"Checkout","url":"http://localhost:3000/checkout","viewport":{"width":375,"height":812}}"#,
        )
        .unwrap();
        assert_eq!(request.viewport, Some(Viewport { width: 375, height: 812 }));

        let script = AccessibilityRunner::script(&request);
        assert!(script.contains("require('@axe-core/playwright')"));
        assert!(script.contains("width: 375, height: 812"));
        assert!(script.contains("new AxeBuilder({ page }).analyze()"));
    }

    #[test]
    fn test_viewport_defaults() {
        let request: AccessibilityRequest =
            serde_json::from_str(r#"{"screenName":"Home","url":"http://x"}"#).unwrap();
        assert!(request.viewport.is_none());
        assert!(AccessibilityRunner::script(&request).contains("width: 1280, height: 720"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stored_report_names_its_file() {
        use crate::pool::ExecutionPool;
        use crate::process::ProcessRunner;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let tmp = tempfile::tempdir().unwrap();
        // Stand-in for node that ignores the script and prints an axe result
        let node = tmp.path().join("fake-node");
        std::fs::write(&node, "#!/bin/sh\necho '{\"violations\":[{\"id\":\"color-contrast\"}],\"passes\":4}'\n").unwrap();
        std::fs::set_permissions(&node, std::fs::Permissions::from_mode(0o755)).unwrap();

        let scripts = ScriptRunner::new(
            node.to_string_lossy(),
            tmp.path(),
            ProcessRunner::default(),
            ExecutionPool::new(1, Duration::from_secs(1)),
        );
        let runner = AccessibilityRunner::new(scripts, tmp.path().join("results"));
        let request: AccessibilityRequest =
            serde_json::from_str(r#"{"screenName":"Home","url":"http://localhost:3000"}"#).unwrap();
        let report = runner.run(request, CancellationToken::new()).await.unwrap();
        assert_eq!(report.violation_count, 1);

        let path = report.result_file.unwrap();
        let file = path.file_name().unwrap().to_str().unwrap();
        let stored = runner.read_result(file).unwrap();
        assert_eq!(stored["resultFile"], path.to_string_lossy().as_ref());
        assert_eq!(stored["violationCount"], 1);
    }
}
