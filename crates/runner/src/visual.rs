//! Visual regression testing with screenshot comparison
//!
//! Screenshots are stored as `<name>-<timestamp>.png` where `name` is the
//! normalized test name and `timestamp` is `%Y%m%d%H%M%S%3f`. The most recent
//! file for a name wins, both for captures and for baselines.

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::{GenericImageView, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::playwright::{js_string, PageScript, ScriptRunner, Viewport};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
const TIMESTAMP_LEN: usize = 17;

/// Per-channel difference tolerated as anti-aliasing noise
const CHANNEL_TOLERANCE: i32 = 5;

/// Result of a visual comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualDiff {
    /// Whether the images match within the threshold
    pub matches: bool,
    pub diff_percent: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub threshold: f64,
    pub dimensions_match: bool,
    pub diff_image_path: Option<PathBuf>,
    pub actual_path: PathBuf,
    pub baseline_path: PathBuf,
    pub actual_hash: String,
    pub baseline_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub test_name: String,
    pub url: String,
    #[serde(default)]
    pub viewport: Option<Viewport>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_full_page")]
    pub full_page: bool,
}

fn default_full_page() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub test_name: String,
    pub path: PathBuf,
    pub hash: String,
    /// Set when no baseline existed and this capture became one
    pub baseline_created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineInfo {
    pub test_name: String,
    pub file: String,
    pub timestamp: String,
    pub size: u64,
}

/// Lowercase, with runs of anything but ASCII letters and digits turned into
/// a single `-`
pub fn normalize_name(name: &str) -> String {
    crate::playwright::file_slug(name)
}

/// Split `<name>-<timestamp>.png` into its parts
fn parse_file_name(file: &str) -> Option<(&str, &str)> {
    let stem = file.strip_suffix(".png")?;
    let (name, ts) = stem.rsplit_once('-')?;
    if name.is_empty() || ts.len() != TIMESTAMP_LEN || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((name, ts))
}

fn hash_file(path: &Path) -> RunnerResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > CHANNEL_TOLERANCE)
}

/// Pixel-compare two PNGs, writing a diff image to `diff_path` when they
/// differ. Pixels outside the overlap of differently sized images count as
/// different.
pub fn compare_images(
    actual_path: &Path,
    baseline_path: &Path,
    diff_path: &Path,
    threshold: f64,
) -> RunnerResult<VisualDiff> {
    let actual_hash = hash_file(actual_path)?;
    let baseline_hash = hash_file(baseline_path)?;
    let actual_img = image::open(actual_path)?;

    if actual_hash == baseline_hash {
        debug!("Screenshots match exactly (same hash)");
        let (w, h) = actual_img.dimensions();
        return Ok(VisualDiff {
            matches: true,
            diff_percent: 0.0,
            diff_pixels: 0,
            total_pixels: w as u64 * h as u64,
            threshold,
            dimensions_match: true,
            diff_image_path: None,
            actual_path: actual_path.to_path_buf(),
            baseline_path: baseline_path.to_path_buf(),
            actual_hash,
            baseline_hash,
        });
    }

    let baseline_img = image::open(baseline_path)?;
    let dimensions_match = actual_img.dimensions() == baseline_img.dimensions();
    if !dimensions_match {
        warn!(
            "Screenshot dimensions differ: actual {:?} vs baseline {:?}",
            actual_img.dimensions(),
            baseline_img.dimensions()
        );
    }

    let actual = actual_img.to_rgba8();
    let baseline = baseline_img.to_rgba8();
    let width = actual.width().max(baseline.width());
    let height = actual.height().max(baseline.height());

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;
    let total_pixels = width as u64 * height as u64;

    for y in 0..height {
        for x in 0..width {
            let in_actual = x < actual.width() && y < actual.height();
            let in_baseline = x < baseline.width() && y < baseline.height();
            if !(in_actual && in_baseline) {
                diff_pixels += 1;
                diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                continue;
            }
            let a = actual.get_pixel(x, y);
            if pixels_differ(a, baseline.get_pixel(x, y)) {
                diff_pixels += 1;
                diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            } else {
                let c = a.channels();
                diff_img.put_pixel(x, y, image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
            }
        }
    }

    let diff_percent = if total_pixels == 0 {
        0.0
    } else {
        diff_pixels as f64 / total_pixels as f64 * 100.0
    };
    let matches = diff_percent <= threshold;

    let diff_image_path = if diff_pixels > 0 {
        if let Some(parent) = diff_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        diff_img.save(diff_path)?;
        Some(diff_path.to_path_buf())
    } else {
        None
    };

    Ok(VisualDiff {
        matches,
        diff_percent,
        diff_pixels,
        total_pixels,
        threshold,
        dimensions_match,
        diff_image_path,
        actual_path: actual_path.to_path_buf(),
        baseline_path: baseline_path.to_path_buf(),
        actual_hash,
        baseline_hash,
    })
}

/// Captures, baselines and diffs under one visual-tests directory
#[derive(Debug, Clone)]
pub struct VisualTester {
    scripts: ScriptRunner,
    baseline_dir: PathBuf,
    actual_dir: PathBuf,
    diff_dir: PathBuf,
    threshold: f64,
    viewport: Viewport,
}

impl VisualTester {
    pub fn new(scripts: ScriptRunner, visual_dir: impl Into<PathBuf>, threshold: f64, viewport: Viewport) -> Self {
        let dir = visual_dir.into();
        Self {
            scripts,
            baseline_dir: dir.join("baselines"),
            actual_dir: dir.join("actual"),
            diff_dir: dir.join("diffs"),
            threshold,
            viewport,
        }
    }

    pub fn baseline_dir(&self) -> &Path {
        &self.baseline_dir
    }

    pub fn actual_dir(&self) -> &Path {
        &self.actual_dir
    }

    fn ensure_dirs(&self) -> RunnerResult<()> {
        std::fs::create_dir_all(&self.baseline_dir)?;
        std::fs::create_dir_all(&self.actual_dir)?;
        std::fs::create_dir_all(&self.diff_dir)?;
        Ok(())
    }

    fn stamped(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}-{}.png", name, Utc::now().format(TIMESTAMP_FORMAT)))
    }

    pub fn capture_script(&self, request: &CaptureRequest, path: &Path) -> String {
        let target = js_string(&path.to_string_lossy());
        let body = match &request.selector {
            Some(selector) => format!(
                "await page.locator({}).screenshot({{ path: {} }});\nresult = {{ path: {} }};",
                js_string(selector),
                target,
                target
            ),
            None => format!(
                "await page.screenshot({{ path: {}, fullPage: {} }});\nresult = {{ path: {} }};",
                target, request.full_page, target
            ),
        };
        PageScript::new(&request.url)
            .viewport(request.viewport.unwrap_or(self.viewport))
            .body(body)
            .build()
    }

    /// Screenshot a page into the actual directory. The first capture of a
    /// name also becomes its baseline.
    pub async fn capture(&self, request: CaptureRequest, cancel: CancellationToken) -> RunnerResult<Capture> {
        let name = normalize_name(&request.test_name);
        if request.url.trim().is_empty() {
            return Err(RunnerError::InvalidRequest("url is required".to_string()));
        }
        self.ensure_dirs()?;

        let path = Self::stamped(&self.actual_dir, &name);
        let script = self.capture_script(&request, &path);
        let outcome = self.scripts.run(&format!("visual:{}", name), &script, cancel).await?;

        if outcome["success"] == false {
            let message = outcome["error"].as_str().unwrap_or("capture failed");
            return Err(RunnerError::Playwright(message.to_string()));
        }
        if !path.is_file() {
            return Err(RunnerError::NoResult(format!("no screenshot written for {}", name)));
        }

        let baseline_created = if self.latest(&self.baseline_dir, &name).is_none() {
            let baseline = Self::stamped(&self.baseline_dir, &name);
            std::fs::copy(&path, &baseline)?;
            info!("Creating baseline for '{}' from first capture", name);
            true
        } else {
            false
        };

        Ok(Capture {
            test_name: name,
            hash: hash_file(&path)?,
            path,
            baseline_created,
        })
    }

    /// Compare the most recent capture of `name` against its most recent
    /// baseline
    pub fn compare(&self, name: &str, threshold: Option<f64>) -> RunnerResult<VisualDiff> {
        let name = normalize_name(name);
        let threshold = threshold.unwrap_or(self.threshold);

        let actual = self.latest(&self.actual_dir, &name).ok_or_else(|| {
            RunnerError::VisualRegression(format!("no capture found for '{}'", name))
        })?;
        let baseline = self
            .latest(&self.baseline_dir, &name)
            .ok_or_else(|| RunnerError::BaselineNotFound(name.clone()))?;

        let diff_path = self.diff_dir.join(format!("{}-diff.png", name));
        let diff = compare_images(&actual, &baseline, &diff_path, threshold)?;
        if !diff.matches {
            warn!(
                "Visual regression detected in '{}': {:.2}% pixels differ (threshold: {:.2}%)",
                name, diff.diff_percent, threshold
            );
        }
        Ok(diff)
    }

    /// Promote the most recent capture of `name` to a new baseline
    pub fn update_baseline(&self, name: &str) -> RunnerResult<PathBuf> {
        let name = normalize_name(name);
        let actual = self.latest(&self.actual_dir, &name).ok_or_else(|| {
            RunnerError::VisualRegression(format!(
                "Cannot update baseline: no capture found for '{}'",
                name
            ))
        })?;

        std::fs::create_dir_all(&self.baseline_dir)?;
        let baseline = Self::stamped(&self.baseline_dir, &name);
        std::fs::copy(&actual, &baseline)?;
        info!("Updated baseline for '{}'", name);
        Ok(baseline)
    }

    /// The most recent baseline per name, sorted by name
    pub fn list_baselines(&self) -> RunnerResult<Vec<BaselineInfo>> {
        let mut latest: std::collections::BTreeMap<String, BaselineInfo> = Default::default();
        let entries = match std::fs::read_dir(&self.baseline_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file = entry.file_name().to_string_lossy().into_owned();
            let Some((name, ts)) = parse_file_name(&file) else {
                continue;
            };
            if latest.get(name).map(|b| b.timestamp.as_str() >= ts).unwrap_or(false) {
                continue;
            }
            let info = BaselineInfo {
                test_name: name.to_string(),
                timestamp: ts.to_string(),
                size: entry.metadata()?.len(),
                file,
            };
            latest.insert(info.test_name.clone(), info);
        }
        Ok(latest.into_values().collect())
    }

    fn latest(&self, dir: &Path, name: &str) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;
        entries
            .flatten()
            .filter_map(|e| {
                let file = e.file_name().to_str()?.to_string();
                let (n, ts) = parse_file_name(&file)?;
                (n == name).then(|| (ts.to_string(), e.path()))
            })
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, path)| path)
    }
}
