//! Timestamped JSON result files for browser checks

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RunnerError, RunnerResult};
use crate::playwright::file_slug;

/// Directory listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFile {
    pub file: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ReportDir {
    dir: PathBuf,
}

impl ReportDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh `<label>-<timestamp>.json` path inside the directory
    pub fn next_path(&self, label: &str) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.json",
            file_slug(label),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        ))
    }

    /// Write `value` to a path handed out by [`ReportDir::next_path`]
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> RunnerResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
        info!("Result written to {}", path.display());
        Ok(())
    }

    pub fn write<T: Serialize>(&self, label: &str, value: &T) -> RunnerResult<PathBuf> {
        let path = self.next_path(label);
        self.save(&path, value)?;
        Ok(path)
    }

    pub fn read(&self, file: &str) -> RunnerResult<serde_json::Value> {
        if file.contains('/') || file.contains('\\') || file.contains("..") || !file.ends_with(".json") {
            return Err(RunnerError::InvalidRequest(format!("invalid result file: {}", file)));
        }
        let path = self.dir.join(file);
        if !path.is_file() {
            return Err(RunnerError::TestNotFound {
                path: file.to_string(),
                searched: vec![path],
            });
        }
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    /// JSON files in the directory, newest first
    pub fn list(&self) -> Vec<ReportFile> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut files: Vec<ReportFile> = entries
            .flatten()
            .filter_map(|entry| {
                let file = entry.file_name().to_str()?.to_string();
                if !file.ends_with(".json") {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(ReportFile {
                    file,
                    size: meta.len(),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                })
            })
            .collect();
        files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.file.cmp(&a.file)));
        files
    }
}
