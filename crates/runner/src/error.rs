//! Error types for test execution

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Test file not found: {path}")]
    TestNotFound { path: String, searched: Vec<PathBuf> },

    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("All {slots} execution slot(s) busy, gave up after {waited_secs}s")]
    Busy { slots: usize, waited_secs: u64 },

    #[error("Run cancelled before it started")]
    Cancelled,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Script produced no result: {0}")]
    NoResult(String),

    #[error("Unknown keyboard check: {0}")]
    UnknownCheck(String),

    #[error("Visual regression: {0}")]
    VisualRegression(String),

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl RunnerError {
    /// Whether the error means the requested thing does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RunnerError::TestNotFound { .. } | RunnerError::BaselineNotFound(_) | RunnerError::UnknownCheck(_)
        )
    }
}

pub type RunnerResult<T> = Result<T, RunnerError>;
