//! Child process execution with live output and cancellation
//!
//! Every run is a fresh OS process. Output is read line by line, forwarded to
//! an optional log sink as it arrives and accumulated for the final
//! [`RunResult`]. Cancelling the token terminates the whole process group:
//! SIGTERM first, SIGKILL after the grace period.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use testdeck_common::{RunResult, KILLED_EXIT_CODE};

use crate::error::{RunnerError, RunnerResult};

/// How long to keep draining pipes once the process group is being killed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One line of runner output
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub stream: LogStream,
    pub message: String,
}

pub type LogSink = mpsc::UnboundedSender<LogLine>;

/// Program and arguments with `{file}` / `{output}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    parts: Vec<String>,
}

impl CommandTemplate {
    pub fn new(parts: Vec<String>) -> RunnerResult<Self> {
        if parts.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
            return Err(RunnerError::InvalidRequest(
                "command template needs a program".to_string(),
            ));
        }
        Ok(Self { parts })
    }

    /// Substitute placeholders, returning program and arguments
    pub fn render(&self, file: &Path, output: Option<&Path>) -> (String, Vec<String>) {
        let file = file.to_string_lossy();
        let output = output.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        let mut rendered = self
            .parts
            .iter()
            .map(|part| part.replace("{file}", &file).replace("{output}", &output));
        let program = rendered.next().unwrap_or_default();
        (program, rendered.collect())
    }

    pub fn uses_output(&self) -> bool {
        self.parts.iter().any(|p| p.contains("{output}"))
    }
}

/// A fully specified process to launch
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Identifier echoed back as `RunResult::test_path`
    pub test_path: String,
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(test_path: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            test_path: test_path.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

/// Spawns invocations and collects their results
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    kill_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ProcessRunner {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Run to completion or cancellation.
    ///
    /// The child inherits this process's environment plus `invocation.envs`.
    /// A nonzero exit is a normal result, not an error; only a failure to
    /// spawn is returned as `Err`.
    pub async fn run(
        &self,
        invocation: Invocation,
        sink: Option<LogSink>,
        cancel: CancellationToken,
    ) -> RunnerResult<RunResult> {
        let started_at = Utc::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "Started {} for {} (pid: {:?})",
            invocation.program,
            invocation.test_path,
            child.id()
        );

        // Group id of the child; still valid for killpg after the leader is reaped
        let group = child.id();

        let stdout_task = tokio::spawn(pump(
            child.stdout.take(),
            LogStream::Stdout,
            sink.clone(),
            cancel.clone(),
        ));
        let stderr_task = tokio::spawn(pump(
            child.stderr.take(),
            LogStream::Stderr,
            sink,
            cancel.clone(),
        ));
        let mut pipes = tokio::spawn(async move {
            (join_output(stdout_task).await, join_output(stderr_task).await)
        });

        let mut exit_code = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Some(status.code().unwrap_or(KILLED_EXIT_CODE)),
                Err(e) => {
                    warn!("Failed waiting on {}: {}", invocation.program, e);
                    Some(KILLED_EXIT_CODE)
                }
            },
            _ = cancel.cancelled() => {
                info!("Cancelling run of {}", invocation.test_path);
                self.terminate(&mut child).await;
                None
            }
        };

        let (output, error_output) = if exit_code.is_some() {
            // The leader is gone but descendants may still hold the pipes.
            tokio::select! {
                joined = &mut pipes => joined.unwrap_or_default(),
                _ = cancel.cancelled() => {
                    info!("Cancelling run of {} after its runner exited", invocation.test_path);
                    exit_code = None;
                    kill_group(group);
                    drain_output(pipes).await
                }
                _ = tokio::time::sleep(self.kill_grace) => {
                    warn!(
                        "Output of {} still open {:?} after exit, killing leftover processes",
                        invocation.test_path, self.kill_grace
                    );
                    kill_group(group);
                    drain_output(pipes).await
                }
            }
        } else {
            drain_output(pipes).await
        };

        let result = match exit_code {
            Some(code) => {
                let parsed = parse_trailing_json(&output);
                if parsed.is_none() && !output.trim().is_empty() {
                    debug!("No JSON result on the last output line of {}", invocation.test_path);
                }
                RunResult::completed(invocation.test_path, code, output, error_output, parsed, started_at)
            }
            None => RunResult::aborted(invocation.test_path, output, error_output, started_at),
        };

        info!(
            "Run of {} finished: {} (exit code {}, {} ms)",
            result.test_path,
            result.status(),
            result.exit_code,
            result.duration_ms
        );
        Ok(result)
    }

    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let group = Pid::from_raw(pid as i32);
            if killpg(group, Signal::SIGTERM).is_ok()
                && tokio::time::timeout(self.kill_grace, child.wait()).await.is_ok()
            {
                // Leader is gone; make sure nothing it started survives.
                let _ = killpg(group, Signal::SIGKILL);
                return;
            }
            let _ = killpg(group, Signal::SIGKILL);
        }

        if let Err(e) = child.kill().await {
            debug!("Kill after termination: {}", e);
        }
    }
}

async fn pump<R>(
    reader: Option<R>,
    stream: LogStream,
    sink: Option<LogSink>,
    cancel: CancellationToken,
) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                collected.push_str(&chunk);
                if let Some(sink) = &sink {
                    if !cancel.is_cancelled() {
                        let message = chunk.trim_end_matches(['\n', '\r']).to_string();
                        let _ = sink.send(LogLine { stream, message });
                    }
                }
            }
            Err(e) => {
                debug!("Stopped reading {:?}: {}", stream, e);
                break;
            }
        }
    }

    collected
}

async fn join_output(task: JoinHandle<String>) -> String {
    task.await.unwrap_or_default()
}

async fn drain_output(mut task: JoinHandle<(String, String)>) -> (String, String) {
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_) => {
            task.abort();
            (String::new(), String::new())
        }
    }
}

/// SIGKILL whatever is left in the child's process group
fn kill_group(group: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = group {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
            debug!("Killed leftover processes in group {}", pid);
        }
    }
    #[cfg(not(unix))]
    let _ = group;
}

/// Parse the last non-empty line of `output` as JSON; never fails
pub fn parse_trailing_json(output: &str) -> Option<serde_json::Value> {
    let last = output.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    serde_json::from_str(last).ok()
}
