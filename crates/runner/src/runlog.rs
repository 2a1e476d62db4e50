//! Per-run log files under the test-results directory

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use testdeck_common::RunResult;

use crate::error::{RunnerError, RunnerResult};

const PREFIX: &str = "run-";

/// Summary of a stored run, without its output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLogEntry {
    pub id: String,
    pub test_path: String,
    pub success: bool,
    pub aborted: bool,
    pub exit_code: i32,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RunLogStore {
    dir: PathBuf,
}

impl RunLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a result as `run-<timestamp>-<slug>.json`, recording the id on
    /// the result before it is stored
    pub fn write(&self, result: &mut RunResult) -> RunnerResult<String> {
        std::fs::create_dir_all(&self.dir)?;
        let id = format!(
            "{}{}-{}-{}",
            PREFIX,
            result.started_at.format("%Y%m%dT%H%M%S%3f"),
            slug(&result.test_path),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.dir.join(format!("{}.json", id));
        result.run_id = Some(id.clone());
        std::fs::write(&path, serde_json::to_string_pretty(result)?)?;
        info!("Run log written to {}", path.display());
        Ok(id)
    }

    pub fn read(&self, id: &str) -> RunnerResult<RunResult> {
        if !id.starts_with(PREFIX) || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(RunnerError::InvalidRequest(format!("invalid run id: {}", id)));
        }
        let path = self.dir.join(format!("{}.json", id));
        if !path.is_file() {
            return Err(RunnerError::TestNotFound {
                path: id.to_string(),
                searched: vec![path],
            });
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Stored runs, newest first; unreadable files are skipped
    pub fn list(&self) -> Vec<RunLogEntry> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .filter(|name| name.starts_with(PREFIX) && name.ends_with(".json"))
            .map(|name| name.trim_end_matches(".json").to_string())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));

        ids.into_iter()
            .filter_map(|id| match self.read(&id) {
                Ok(result) => Some(RunLogEntry {
                    id,
                    test_path: result.test_path,
                    success: result.success,
                    aborted: result.aborted,
                    exit_code: result.exit_code,
                    started_at: result.started_at,
                    duration_ms: result.duration_ms,
                }),
                Err(e) => {
                    debug!("Skipping run log {}: {}", id, e);
                    None
                }
            })
            .collect()
    }
}

fn slug(test_path: &str) -> String {
    let slug: String = test_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.len() > 60 { &slug[slug.len() - 60..] } else { slug };
    if slug.is_empty() { "test".to_string() } else { slug.to_string() }
}
