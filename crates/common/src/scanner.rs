//! Filesystem test discovery
//!
//! Walks a test root depth-first, picks out files that follow the usual
//! JavaScript/TypeScript test naming conventions and classifies each one by
//! type and category. The walk is read-only; a subtree that cannot be read is
//! logged and skipped without failing the scan.

use std::collections::HashSet;
use std::path::{Path, MAIN_SEPARATOR};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::types::{TestDescriptor, TestType};

/// Directory names that are never descended into
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "coverage",
    "__snapshots__",
    ".next",
    ".vscode",
];

const TEST_SUFFIXES: &[&str] = &[".test.js", ".spec.js", ".test.ts", ".spec.ts"];

/// Ordered classification rules; the first rule with a matching needle wins.
const TYPE_RULES: &[(&[&str], TestType)] = &[
    (&["visual"], TestType::Visual),
    (&["accessibility", "a11y"], TestType::Accessibility),
    (&["smoke"], TestType::Smoke),
    (&["e2e", "end-to-end"], TestType::E2e),
    (&["unit"], TestType::Unit),
    (&["integration"], TestType::Integration),
    (&["performance"], TestType::Performance),
    (&["security"], TestType::Security),
];

/// Scans a directory tree for test files
#[derive(Debug, Clone)]
pub struct TestScanner {
    excluded: Vec<String>,
    extra_suffixes: Vec<String>,
}

impl Default for TestScanner {
    fn default() -> Self {
        Self {
            excluded: EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            extra_suffixes: Vec::new(),
        }
    }
}

impl TestScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add another directory name to skip
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    /// Also treat files ending in `suffix` as tests (e.g. `.k6.js`)
    pub fn also_match(mut self, suffix: impl Into<String>) -> Self {
        self.extra_suffixes.push(suffix.into());
        self
    }

    fn matches(&self, file_name: &str) -> bool {
        is_test_file(file_name) || self.extra_suffixes.iter().any(|s| file_name.ends_with(s.as_str()))
    }

    /// Scan `root` and return one descriptor per test file, in walk order.
    ///
    /// A missing root yields an empty list.
    pub fn scan(&self, root: &Path) -> Vec<TestDescriptor> {
        if !root.is_dir() {
            debug!("Test root {} does not exist", root.display());
            return Vec::new();
        }

        let root_type = root
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(TestType::from_name)
            .filter(|t| *t != TestType::Other);

        let mut seen_ids = HashSet::new();
        let mut tests = Vec::new();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Skipping unreadable path {}: {}",
                        e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                        e
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !self.matches(&file_name) {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = normalize_separators(&relative.to_string_lossy());

            let metadata = entry.metadata().ok();
            let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
            let modified = metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            let id = unique_id(&mut seen_ids, derive_id(&relative));

            tests.push(TestDescriptor {
                id,
                name: display_name(&file_name),
                test_type: classify(&relative, root_type),
                category: category_of(&relative),
                path: relative,
                size,
                modified,
            });
        }

        debug!("Found {} test file(s) under {}", tests.len(), root.display());
        tests
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .map(|name| self.excluded.iter().any(|ex| ex == name))
                .unwrap_or(false)
    }
}

/// Scan with the default exclusion list
pub fn scan(root: &Path) -> Vec<TestDescriptor> {
    TestScanner::default().scan(root)
}

/// Whether a file name follows one of the test naming conventions
pub fn is_test_file(name: &str) -> bool {
    TEST_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
        || (name.ends_with(".js") && (name.contains(".test.") || name.contains(".spec.")))
}

/// Infer a test type from a relative path (file name included).
///
/// `root_type` is the type named by the scanned root directory itself, used
/// only when no rule matches the path.
pub fn classify(relative_path: &str, root_type: Option<TestType>) -> TestType {
    let haystack = relative_path.to_lowercase();
    TYPE_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| haystack.contains(n)))
        .map(|(_, t)| *t)
        .or(root_type)
        .unwrap_or(TestType::Other)
}

/// First path segment, or `other` for files directly under the root
pub fn category_of(relative_path: &str) -> String {
    match relative_path.split_once('/') {
        Some((first, _)) if !first.is_empty() => first.to_string(),
        _ => "other".to_string(),
    }
}

/// `e2e/login.spec.js` -> `e2e-login.spec`
pub fn derive_id(relative_path: &str) -> String {
    let (dir, file) = match relative_path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, relative_path),
    };
    let stem = match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    };
    match dir {
        Some(dir) => format!("{}-{}", dir.replace('/', "-"), stem),
        None => stem.to_string(),
    }
}

fn unique_id(seen: &mut HashSet<String>, id: String) -> String {
    if seen.insert(id.clone()) {
        return id;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", id, n);
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// `user-login.spec.js` -> `User Login`
pub fn display_name(file_name: &str) -> String {
    let base = [".test.", ".spec."]
        .iter()
        .filter_map(|marker| file_name.find(marker))
        .min()
        .map(|idx| &file_name[..idx])
        .unwrap_or_else(|| file_name.rsplit_once('.').map(|(b, _)| b).unwrap_or(file_name));

    let words: Vec<String> = base
        .split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();

    if words.is_empty() {
        file_name.to_string()
    } else {
        words.join(" ")
    }
}

/// Replace platform separators (and stray backslashes) with `/`
pub fn normalize_separators(path: &str) -> String {
    let path = path.replace('\\', "/");
    if MAIN_SEPARATOR != '/' {
        path.replace(MAIN_SEPARATOR, "/")
    } else {
        path
    }
}
