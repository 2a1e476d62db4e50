//! k6 load test support
//!
//! k6 writes one JSON object per line with `--out json=<file>`. Metric
//! samples (`"type": "Point"`) are folded into per-metric statistics, which
//! become the structured result of a k6 run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};

/// Aggregate of every sample of one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl MetricStats {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
            avg: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.avg = self.sum / self.count as f64;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K6Summary {
    pub metrics: BTreeMap<String, MetricStats>,
    /// Lines that were not valid JSON
    pub skipped_lines: usize,
}

#[derive(Deserialize)]
struct K6Line {
    #[serde(rename = "type")]
    kind: String,
    metric: Option<String>,
    data: Option<K6Data>,
}

#[derive(Deserialize)]
struct K6Data {
    value: Option<f64>,
}

impl K6Summary {
    /// Fold an NDJSON stream; malformed lines are counted, not fatal
    pub fn from_ndjson(content: &str) -> Self {
        let mut summary = Self::default();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let parsed: K6Line = match serde_json::from_str(line) {
                Ok(parsed) => parsed,
                Err(_) => {
                    summary.skipped_lines += 1;
                    continue;
                }
            };
            if parsed.kind != "Point" {
                continue;
            }
            let (Some(metric), Some(value)) = (parsed.metric, parsed.data.and_then(|d| d.value)) else {
                continue;
            };
            summary
                .metrics
                .entry(metric)
                .and_modify(|s| s.add(value))
                .or_insert_with(|| MetricStats::new(value));
        }
        summary
    }

    pub fn from_file(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let summary = Self::from_ndjson(&content);
        if summary.skipped_lines > 0 {
            warn!("{} unparseable line(s) in {}", summary.skipped_lines, path.display());
        }
        Ok(summary)
    }
}

/// Whether a test path should run under k6 rather than Playwright
pub fn is_k6_script(path: &str) -> bool {
    let lower = path.replace('\\', "/").to_lowercase();
    lower.ends_with(".k6.js")
        || lower.split('/').any(|segment| segment == "k6")
        || lower.rsplit('/').next().map(|f| f.starts_with("k6-") || f.starts_with("k6_")).unwrap_or(false)
}

/// Finds k6 scripts by name in a fixed list of directories
#[derive(Debug, Clone)]
pub struct K6Locator {
    dirs: Vec<PathBuf>,
}

impl K6Locator {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Every path tried for `name`, in order
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        let name = name.replace('\\', "/");
        let mut file_names = vec![name.clone()];
        if !name.ends_with(".js") {
            file_names.push(format!("{}.js", name));
        }
        self.dirs
            .iter()
            .flat_map(|dir| file_names.iter().map(move |f| dir.join(f)))
            .collect()
    }

    pub fn locate(&self, name: &str) -> RunnerResult<PathBuf> {
        if name.contains("..") {
            return Err(RunnerError::InvalidRequest(format!("invalid k6 test name: {}", name)));
        }
        let candidates = self.candidates(name);
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => {
                debug!("Located k6 script {} at {}", name, found.display());
                Ok(found.clone())
            }
            None => Err(RunnerError::TestNotFound {
                path: name.to_string(),
                searched: candidates,
            }),
        }
    }

    /// Script file names across all directories, first directory wins on duplicates
    pub fn list(&self) -> Vec<K6Script> {
        let mut seen = std::collections::HashSet::new();
        let mut scripts = Vec::new();
        for dir in &self.dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut names: Vec<_> = entries
                .flatten()
                .filter(|e| e.path().extension().map(|x| x == "js").unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().map(String::from))
                .collect();
            names.sort();
            for name in names {
                if seen.insert(name.clone()) {
                    scripts.push(K6Script {
                        name: name.trim_end_matches(".js").to_string(),
                        path: dir.join(&name).to_string_lossy().into_owned(),
                    });
                }
            }
        }
        scripts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K6Script {
    pub name: String,
    pub path: String,
}
