//! `testdeck run`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use testdeck_common::{AppConfig, RunResult, RunStatus};
use testdeck_runner::{LogLine, LogStream, Orchestrator, OrchestratorConfig, RunRequest, RunnerKind};

use crate::output::print_error;

#[derive(Args)]
pub struct RunArgs {
    /// Test path, resolved against the project root and tests directory
    path: String,

    /// Environment name passed to the runner
    #[arg(short, long)]
    env: Option<String>,

    /// Base URL passed to the runner
    #[arg(long)]
    base_url: Option<String>,

    /// Run with k6 regardless of the file name
    #[arg(long)]
    k6: bool,
}

/// Returns the process exit code to use
pub async fn execute(args: RunArgs, config: AppConfig) -> Result<i32> {
    let orchestrator = Orchestrator::new(OrchestratorConfig::from_app(&config))?;

    let mut request = RunRequest::new(&args.path);
    request.env = args.env;
    request.base_url = args.base_url;
    if args.k6 {
        request = request.kind(RunnerKind::K6);
    }

    let (log_tx, mut log_rx) = mpsc::unbounded_channel::<LogLine>();
    let printer = tokio::spawn(async move {
        while let Some(line) = log_rx.recv().await {
            match line.stream {
                LogStream::Stdout => println!("{}", line.message),
                LogStream::Stderr => eprintln!("{}", line.message),
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping run");
            interrupt.cancel();
        }
    });

    let outcome = orchestrator.run(request, Some(log_tx), cancel).await;
    let _ = printer.await;

    match outcome {
        Ok(result) => {
            summarize(&result);
            Ok(exit_code(&result))
        }
        Err(e) => {
            print_error(&e.to_string());
            if let testdeck_runner::RunnerError::TestNotFound { searched, .. } = &e {
                for path in searched {
                    eprintln!("  searched {}", path.display());
                }
            }
            Ok(2)
        }
    }
}

fn summarize(result: &RunResult) {
    let status = match result.status() {
        RunStatus::Passed => "PASSED".green().bold(),
        RunStatus::Failed => "FAILED".red().bold(),
        RunStatus::Error => "ERROR".red().bold(),
        RunStatus::Aborted => "ABORTED".yellow().bold(),
    };
    eprintln!(
        "{} {} (exit code {}, {} ms)",
        status, result.test_path, result.exit_code, result.duration_ms
    );
    if let Some(results) = &result.parsed_results {
        if let Ok(pretty) = serde_json::to_string_pretty(results) {
            eprintln!("{}", pretty);
        }
    }
}

/// Exit codes outside 1..=255 (killed, aborted) become 1
fn exit_code(result: &RunResult) -> i32 {
    match result.exit_code {
        0 => 0,
        code @ 1..=255 => code,
        _ => 1,
    }
}
