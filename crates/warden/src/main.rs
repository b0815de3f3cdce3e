// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use warden::config::WardenConfig;

/// Keeps a client session alive and lends its access token to local processes.
#[derive(Debug, Parser)]
#[command(name = "warden", version)]
struct Cli {
    #[command(flatten)]
    config: WardenConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = warden::run(cli.config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
