//! Application configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::StorePolicy;
use crate::{Error, Result};

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "testdeck.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub runner: RunnerConfig,
    pub store: StoreConfig,
    pub visual: VisualConfig,
    pub jira: JiraConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deployment environment name (`NODE_ENV`)
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3005,
            environment: "development".to_string(),
        }
    }
}

/// Filesystem locations, relative paths resolve against the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub project_root: PathBuf,
    pub tests_dir: PathBuf,
    pub performance_dir: PathBuf,
    /// Searched in order when locating a k6 script by name
    pub k6_dirs: Vec<PathBuf>,
    /// Per-run log files
    pub test_results_dir: PathBuf,
    /// Accessibility and keyboard result files
    pub results_dir: PathBuf,
    /// Baseline, actual and diff screenshots
    pub visual_dir: PathBuf,
    pub flows_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            tests_dir: PathBuf::from("tests"),
            performance_dir: PathBuf::from("tests/performance"),
            k6_dirs: vec![
                PathBuf::from("k6"),
                PathBuf::from("tests/k6"),
                PathBuf::from("tests/performance/k6"),
            ],
            test_results_dir: PathBuf::from("test-results"),
            results_dir: PathBuf::from("results"),
            visual_dir: PathBuf::from("visual-tests"),
            flows_file: PathBuf::from("temp/flows.json"),
        }
    }
}

/// External runner invocation and admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Value injected as `env` / `TEST_ENV` when a request names none
    pub default_env: String,
    /// Injected as `BASE_URL` and `PLAYWRIGHT_TEST_BASE_URL` when set
    pub base_url: Option<String>,
    /// Command template; `{file}` and `{output}` are substituted
    pub playwright_command: Vec<String>,
    pub k6_command: Vec<String>,
    /// Interpreter for generated browser scripts
    pub node_binary: String,
    pub max_concurrent_runs: usize,
    pub queue_wait_secs: u64,
    /// Time between SIGTERM and SIGKILL when a run is cancelled
    pub kill_grace_ms: u64,
    pub write_run_logs: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_env: "qa".to_string(),
            base_url: None,
            playwright_command: vec![
                "npx".into(),
                "playwright".into(),
                "test".into(),
                "{file}".into(),
                "--reporter=json".into(),
            ],
            k6_command: vec![
                "k6".into(),
                "run".into(),
                "--out".into(),
                "json={output}".into(),
                "{file}".into(),
            ],
            node_binary: "node".to_string(),
            max_concurrent_runs: 4,
            queue_wait_secs: 30,
            kill_grace_ms: 2000,
            write_run_logs: true,
        }
    }
}

impl RunnerConfig {
    pub fn queue_wait(&self) -> Duration {
        Duration::from_secs(self.queue_wait_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Bounds for the in-memory flow and behavior-session stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub flow_ttl_secs: Option<u64>,
    pub max_flows: Option<usize>,
    pub persist_flows: bool,
    pub session_ttl_secs: Option<u64>,
    pub max_sessions: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flow_ttl_secs: None,
            max_flows: Some(1_000),
            persist_flows: true,
            session_ttl_secs: Some(24 * 60 * 60),
            max_sessions: Some(10_000),
        }
    }
}

impl StoreConfig {
    pub fn flow_policy(&self) -> StorePolicy {
        StorePolicy {
            ttl: self.flow_ttl_secs.map(Duration::from_secs),
            max_entries: self.max_flows,
        }
    }

    pub fn session_policy(&self) -> StorePolicy {
        StorePolicy {
            ttl: self.session_ttl_secs.map(Duration::from_secs),
            max_entries: self.max_sessions,
        }
    }
}

/// Screenshot comparison defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Percent of differing pixels tolerated
    pub threshold: f64,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// Jira REST credentials; Jira endpoints are disabled while `host` is unset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub host: Option<String>,
    pub username: Option<String>,
    pub api_token: Option<String>,
    pub api_version: String,
    pub strict_ssl: bool,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            api_token: None,
            api_version: "2".to_string(),
            strict_ssl: true,
        }
    }
}

impl JiraConfig {
    pub fn is_configured(&self) -> bool {
        self.host.as_deref().map(|h| !h.trim().is_empty()).unwrap_or(false)
    }
}

impl AppConfig {
    /// Load configuration from file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Load from file and apply process environment overrides
    pub fn from_env_and_file(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// `PLAYWRIGHT_TEST_BASE_URL` wins over `BASE_URL`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT").and_then(|v| v.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(env) = get("NODE_ENV") {
            self.server.environment = env;
        }
        if let Some(test_env) = get("TEST_ENV") {
            self.runner.default_env = test_env;
        }
        if let Some(url) = get("PLAYWRIGHT_TEST_BASE_URL").or_else(|| get("BASE_URL")) {
            self.runner.base_url = Some(url);
        }
        if let Some(host) = get("JIRA_HOST") {
            self.jira.host = Some(host);
        }
        if let Some(user) = get("JIRA_USERNAME") {
            self.jira.username = Some(user);
        }
        if let Some(token) = get("JIRA_API_TOKEN") {
            self.jira.api_token = Some(token);
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
