//! `testdeck serve`

use anyhow::Result;
use clap::Args;

use testdeck_common::AppConfig;

#[derive(Args)]
pub struct ServeArgs {
    /// Listen port, overrides the config file and PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    host: Option<String>,
}

pub async fn execute(args: ServeArgs, mut config: AppConfig) -> Result<()> {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    testdeck_web::serve(config).await
}
