//! testdeck CLI
//!
//! Scans test trees, runs a single test with live output, and starts the API
//! server.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use testdeck_common::{AppConfig, DEFAULT_CONFIG_FILE};

mod commands;
mod output;

use commands::{keyboard, run, scan, serve};

#[derive(Parser)]
#[command(name = "testdeck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file; missing is fine, defaults apply
    #[arg(short, long, env = "TESTDECK_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List test files under a directory
    Scan(scan::ScanArgs),

    /// Run one test and stream its output
    Run(run::RunArgs),

    /// Start the HTTP API
    Serve(serve::ServeArgs),

    /// Keyboard interaction checks
    #[command(subcommand)]
    Keyboard(keyboard::KeyboardCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env_and_file(&cli.config)?;

    match cli.command {
        Commands::Scan(args) => scan::execute(args, &config, cli.format)?,
        Commands::Run(args) => {
            let code = run::execute(args, config).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Serve(args) => serve::execute(args, config).await?,
        Commands::Keyboard(cmd) => keyboard::execute(cmd, cli.format),
    }

    Ok(())
}
