//! Resolve, admit, execute
//!
//! The orchestrator ties path resolution, the execution pool and the process
//! runner together. Each run gets its own scratch directory for the runner's
//! structured output file; when that file is present it replaces whatever was
//! scraped from the last stdout line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use testdeck_common::{AppConfig, RunResult};

use crate::error::{RunnerError, RunnerResult};
use crate::k6::{is_k6_script, K6Summary};
use crate::playwright::ScriptRunner;
use crate::pool::ExecutionPool;
use crate::process::{CommandTemplate, Invocation, LogSink, ProcessRunner};
use crate::resolve::{absolutize, PathResolver};
use crate::runlog::RunLogStore;

/// Environment variable Playwright's JSON reporter writes to
const PLAYWRIGHT_JSON_OUTPUT: &str = "PLAYWRIGHT_JSON_OUTPUT_NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Playwright,
    K6,
}

impl RunnerKind {
    /// Pick the runner from the file name convention
    pub fn for_path(path: &str) -> Self {
        if is_k6_script(path) {
            RunnerKind::K6
        } else {
            RunnerKind::Playwright
        }
    }
}

/// What to run and how
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub test_path: String,
    /// Environment name; the configured default when `None`
    pub env: Option<String>,
    pub base_url: Option<String>,
    /// Overrides detection from the file name
    pub kind: Option<RunnerKind>,
}

impl RunRequest {
    pub fn new(test_path: impl Into<String>) -> Self {
        Self {
            test_path: test_path.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn kind(mut self, kind: RunnerKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub project_root: PathBuf,
    pub tests_dir: PathBuf,
    pub playwright_command: Vec<String>,
    pub k6_command: Vec<String>,
    pub node_binary: String,
    pub default_env: String,
    pub base_url: Option<String>,
    pub max_concurrent_runs: usize,
    pub queue_wait: Duration,
    pub kill_grace: Duration,
    /// Where run logs go; `None` disables them
    pub run_log_dir: Option<PathBuf>,
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            project_root: config.paths.project_root.clone(),
            tests_dir: config.paths.tests_dir.clone(),
            playwright_command: config.runner.playwright_command.clone(),
            k6_command: config.runner.k6_command.clone(),
            node_binary: config.runner.node_binary.clone(),
            default_env: config.runner.default_env.clone(),
            base_url: config.runner.base_url.clone(),
            max_concurrent_runs: config.runner.max_concurrent_runs,
            queue_wait: config.runner.queue_wait(),
            kill_grace: config.runner.kill_grace(),
            run_log_dir: config
                .runner
                .write_run_logs
                .then(|| config.paths.test_results_dir.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    resolver: PathResolver,
    project_root: PathBuf,
    playwright: CommandTemplate,
    k6: CommandTemplate,
    process: ProcessRunner,
    pool: ExecutionPool,
    scripts: ScriptRunner,
    default_env: String,
    base_url: Option<String>,
    run_logs: Option<RunLogStore>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> RunnerResult<Self> {
        let resolver = PathResolver::new(&config.project_root, &config.tests_dir);
        let process = ProcessRunner::new(config.kill_grace);
        let pool = ExecutionPool::new(config.max_concurrent_runs, config.queue_wait);
        let scripts = ScriptRunner::new(
            config.node_binary,
            &config.project_root,
            process.clone(),
            pool.clone(),
        );
        Ok(Self {
            project_root: config.project_root,
            resolver,
            playwright: CommandTemplate::new(config.playwright_command)?,
            k6: CommandTemplate::new(config.k6_command)?,
            process,
            pool,
            scripts,
            default_env: config.default_env,
            base_url: config.base_url,
            run_logs: config.run_log_dir.map(RunLogStore::new),
        })
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    /// Node script runner sharing this orchestrator's slots
    pub fn scripts(&self) -> &ScriptRunner {
        &self.scripts
    }

    pub fn run_logs(&self) -> Option<&RunLogStore> {
        self.run_logs.as_ref()
    }

    /// Resolve `request.test_path` and run it
    pub async fn run(
        &self,
        request: RunRequest,
        sink: Option<LogSink>,
        cancel: CancellationToken,
    ) -> RunnerResult<RunResult> {
        let resolved = self.resolver.resolve(&request.test_path).map_err(|e| {
            warn!("{}", e);
            e
        })?;
        self.run_file(request, &resolved, sink, cancel).await
    }

    /// Run an already located file
    pub async fn run_file(
        &self,
        request: RunRequest,
        file: &Path,
        sink: Option<LogSink>,
        cancel: CancellationToken,
    ) -> RunnerResult<RunResult> {
        // The runner starts in the project root, so relative paths would be
        // read against the wrong directory.
        let file = absolutize(file);
        let kind = request.kind.unwrap_or_else(|| RunnerKind::for_path(&self.kind_hint(&request, &file)));

        let _slot = self.pool.acquire(&cancel).await?;

        let scratch = tempfile::Builder::new().prefix("testdeck-run-").tempdir()?;
        let output_file = scratch.path().join("results.json");
        let invocation = self.invocation(&request, kind, &file, &output_file);

        info!(
            "Running {} with {:?} (env: {})",
            request.test_path,
            kind,
            request.env.as_deref().unwrap_or(&self.default_env)
        );

        let mut result = self.process.run(invocation, sink, cancel).await?;

        if !result.aborted {
            if let Some(structured) = read_structured_output(kind, &output_file) {
                result.parsed_results = Some(structured);
            }
        }

        if let Some(logs) = &self.run_logs {
            if let Err(e) = logs.write(&mut result) {
                warn!("Failed to write run log for {}: {}", result.test_path, e);
            }
        }

        Ok(result)
    }

    /// Path used to pick a runner: relative to the test roots, so directories
    /// above the project never influence the choice
    fn kind_hint(&self, request: &RunRequest, file: &Path) -> String {
        if let Some(relative) = self.resolver.relative_to_roots(file) {
            return relative;
        }
        if Path::new(&request.test_path).is_relative() {
            return request.test_path.clone();
        }
        file.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn invocation(&self, request: &RunRequest, kind: RunnerKind, file: &Path, output: &Path) -> Invocation {
        let template = match kind {
            RunnerKind::Playwright => &self.playwright,
            RunnerKind::K6 => &self.k6,
        };
        let (program, args) = template.render(file, Some(output));
        let env = request.env.clone().unwrap_or_else(|| self.default_env.clone());

        let mut invocation = Invocation::new(request.test_path.clone(), program)
            .args(args)
            .env("env", env.clone())
            .env("TEST_ENV", env)
            .current_dir(&self.project_root);

        if let Some(url) = request.base_url.as_ref().or(self.base_url.as_ref()) {
            invocation = invocation
                .env("BASE_URL", url.clone())
                .env("PLAYWRIGHT_TEST_BASE_URL", url.clone());
        }
        if kind == RunnerKind::Playwright {
            invocation = invocation.env(PLAYWRIGHT_JSON_OUTPUT, output.to_string_lossy());
        }
        invocation
    }
}

fn read_structured_output(kind: RunnerKind, path: &Path) -> Option<serde_json::Value> {
    if !path.is_file() {
        return None;
    }
    let parsed = match kind {
        RunnerKind::K6 => K6Summary::from_file(path).and_then(|s| Ok(serde_json::to_value(s)?)),
        RunnerKind::Playwright => std::fs::read_to_string(path)
            .map_err(RunnerError::from)
            .and_then(|c| Ok(serde_json::from_str(&c)?)),
    };
    match parsed {
        Ok(value) => {
            debug!("Using structured output from {}", path.display());
            Some(value)
        }
        Err(e) => {
            warn!("Ignoring unreadable runner output {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_detection() {
        assert_eq!(RunnerKind::for_path("perf/checkout.k6.js"), RunnerKind::K6);
        assert_eq!(RunnerKind::for_path("e2e/login.spec.js"), RunnerKind::Playwright);
    }

    #[test]
    fn test_invocation_env() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::from_app(&AppConfig::default());
        config.project_root = tmp.path().to_path_buf();
        config.base_url = Some("http://qa.local".into());
        let orchestrator = Orchestrator::new(config).unwrap();

        let request = RunRequest::new("e2e/login.spec.js").env("staging");
        let inv = orchestrator.invocation(
            &request,
            RunnerKind::Playwright,
            Path::new("/t/e2e/login.spec.js"),
            Path::new("/o/results.json"),
        );

        assert_eq!(inv.program, "npx");
        assert!(inv.args.contains(&"/t/e2e/login.spec.js".to_string()));
        let env = |k: &str| inv.envs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(env("env").as_deref(), Some("staging"));
        assert_eq!(env("PLAYWRIGHT_TEST_BASE_URL").as_deref(), Some("http://qa.local"));
        assert_eq!(env(PLAYWRIGHT_JSON_OUTPUT).as_deref(), Some("/o/results.json"));
    }

    #[test]
    fn test_default_env_is_qa() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::from_app(&AppConfig::default())).unwrap();
        let inv = orchestrator.invocation(
            &RunRequest::new("a.k6.js"),
            RunnerKind::K6,
            Path::new("/t/a.k6.js"),
            Path::new("/o/out.json"),
        );
        assert_eq!(inv.program, "k6");
        assert!(inv.args.contains(&"json=/o/out.json".to_string()));
        assert!(inv.envs.contains(&("env".to_string(), "qa".to_string())));
    }
}
