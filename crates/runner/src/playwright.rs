//! Playwright page scripts
//!
//! Accessibility, keyboard and visual checks drive a browser through small
//! generated node scripts. Each script opens one page, runs a body that fills
//! in `result`, and prints `{success, ...result, screenshots}` as its last
//! stdout line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::pool::ExecutionPool;
use crate::process::{Invocation, ProcessRunner};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Quote a value as a JavaScript string literal
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Builder for a single-page Playwright script
#[derive(Debug, Clone)]
pub struct PageScript {
    url: String,
    browser: Browser,
    viewport: Viewport,
    requires: Vec<String>,
    screenshot_dir: Option<(PathBuf, String)>,
    body: String,
}

impl PageScript {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            browser: Browser::default(),
            viewport: Viewport::default(),
            requires: Vec::new(),
            screenshot_dir: None,
            body: String::new(),
        }
    }

    pub fn browser(mut self, browser: Browser) -> Self {
        self.browser = browser;
        self
    }

    pub fn viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Extra top-level statement, usually a `require`
    pub fn require(mut self, statement: impl Into<String>) -> Self {
        self.requires.push(statement.into());
        self
    }

    /// Enable the `shot(label)` helper, saving `<dir>/<prefix>-<label>.png`
    pub fn screenshots(mut self, dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        self.screenshot_dir = Some((dir.into(), prefix.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(&self) -> String {
        let mut script = String::new();

        script.push_str("const { chromium, firefox, webkit } = require('playwright');\n");
        script.push_str("const path = require('path');\n");
        for statement in &self.requires {
            script.push_str(statement);
            script.push('\n');
        }

        let (shot_dir, shot_prefix) = match &self.screenshot_dir {
            Some((dir, prefix)) => (js_string(&dir.to_string_lossy()), js_string(prefix)),
            None => ("null".to_string(), js_string("")),
        };

        script.push_str(&format!(
            r#"
(async () => {{
  const browser = await {browser}.launch({{ headless: true }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  const screenshots = [];
  const shotDir = {shot_dir};
  const shot = async (label, options = {{}}) => {{
    if (!shotDir) return null;
    const file = path.join(shotDir, {shot_prefix} + '-' + label + '.png');
    await page.screenshot({{ path: file, ...options }});
    screenshots.push(file);
    return file;
  }};
  let result = {{}};

  try {{
    await page.goto({url}, {{ waitUntil: 'networkidle' }});
"#,
            browser = self.browser.as_str(),
            width = self.viewport.width,
            height = self.viewport.height,
            shot_dir = shot_dir,
            shot_prefix = shot_prefix,
            url = js_string(&self.url),
        ));

        for line in self.body.lines() {
            if line.trim().is_empty() {
                script.push('\n');
            } else {
                script.push_str("    ");
                script.push_str(line);
                script.push('\n');
            }
        }

        script.push_str(
            r#"
    console.log(JSON.stringify({ success: true, ...result, screenshots }));
  } catch (error) {
    console.log(JSON.stringify({ success: false, error: error.message, screenshots }));
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        script
    }
}

/// Runs generated scripts with node inside the shared execution pool
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    node: String,
    project_root: PathBuf,
    process: ProcessRunner,
    pool: ExecutionPool,
}

impl ScriptRunner {
    pub fn new(
        node: impl Into<String>,
        project_root: impl Into<PathBuf>,
        process: ProcessRunner,
        pool: ExecutionPool,
    ) -> Self {
        Self {
            node: node.into(),
            project_root: project_root.into(),
            process,
            pool,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Run a script and return its JSON result line.
    ///
    /// A script that reports `success: false` still yields `Ok`; callers look
    /// at the payload. Output without a JSON line is an error.
    pub async fn run(
        &self,
        label: &str,
        script: &str,
        cancel: CancellationToken,
    ) -> RunnerResult<serde_json::Value> {
        let _slot = self.pool.acquire(&cancel).await?;

        let scratch = tempfile::Builder::new().prefix("testdeck-script-").tempdir()?;
        let script_path = scratch.path().join("script.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script for {}: {}", label, script_path.display());

        // Scripts live in a temp dir, so point module resolution at the project
        let node_path = self.project_root.join("node_modules");
        let invocation = Invocation::new(label, self.node.clone())
            .args([script_path.to_string_lossy().into_owned()])
            .env("NODE_PATH", node_path.to_string_lossy())
            .current_dir(&self.project_root);

        let result = self.process.run(invocation, None, cancel).await?;
        if result.aborted {
            return Err(RunnerError::Cancelled);
        }

        match result.parsed_results {
            Some(value) => Ok(value),
            None if result.success => Err(RunnerError::NoResult(label.to_string())),
            None => {
                let stderr = result.error_output.trim();
                warn!("Playwright script for {} failed: {}", label, stderr);
                Err(RunnerError::Playwright(if stderr.is_empty() {
                    format!("script exited with code {}", result.exit_code)
                } else {
                    stderr.to_string()
                }))
            }
        }
    }
}

/// Collapse a free-form label into a file-name-safe slug
pub fn file_slug(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}
