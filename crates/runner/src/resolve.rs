//! Locating a test file from a client-supplied path
//!
//! Clients send paths relative to whatever they were shown (the project, the
//! tests directory, or just a file name). Candidates are tried in a fixed
//! order and the first one that exists wins.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

#[derive(Debug, Clone)]
pub struct PathResolver {
    project_root: PathBuf,
    tests_dir: PathBuf,
}

impl PathResolver {
    /// Relative roots are anchored at the current working directory
    pub fn new(project_root: impl Into<PathBuf>, tests_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: absolutize(&project_root.into()),
            tests_dir: absolutize(&tests_dir.into()),
        }
    }

    pub fn tests_dir(&self) -> &Path {
        &self.tests_dir
    }

    /// `file` relative to the tests directory, else to the project root
    pub fn relative_to_roots(&self, file: &Path) -> Option<String> {
        [&self.tests_dir, &self.project_root]
            .iter()
            .find_map(|root| file.strip_prefix(root).ok())
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }

    /// Candidate locations, in the order they are tried:
    /// the input itself, then under the project root, then under the tests
    /// directory, then its file name under the tests directory.
    pub fn candidates(&self, input: &str) -> Vec<PathBuf> {
        let normalized = input.replace('\\', "/");
        let relative = normalized.trim_start_matches("./");
        let as_path = Path::new(&normalized);

        let mut candidates = vec![
            absolutize(as_path),
            self.project_root.join(relative),
            self.tests_dir.join(relative),
        ];
        if let Some(name) = as_path.file_name() {
            candidates.push(self.tests_dir.join(name));
        }
        candidates
    }

    /// First existing candidate, or `TestNotFound` listing all of them
    pub fn resolve(&self, input: &str) -> RunnerResult<PathBuf> {
        let candidates = self.candidates(input);
        match candidates.iter().find(|c| c.is_file()) {
            Some(found) => {
                debug!("Resolved {} to {}", input, found.display());
                Ok(found.clone())
            }
            None => Err(RunnerError::TestNotFound {
                path: input.to_string(),
                searched: candidates,
            }),
        }
    }
}

pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
