use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use testdeck_common::{AppConfig, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "testdeck-web")]
#[command(about = "testdeck API server", long_about = None)]
#[command(version)]
struct Args {
    /// Config file; missing is fine, defaults apply
    #[arg(short, long, env = "TESTDECK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Listen port, overrides the config file and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env_and_file(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!(
        "Starting testdeck-web ({} environment, tests in {})",
        config.server.environment,
        config.paths.tests_dir.display()
    );

    testdeck_web::serve(config).await
}
