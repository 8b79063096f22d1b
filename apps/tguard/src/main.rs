use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

mod cli;

use tguard_provider::{UpstreamClient, UpstreamClientConfig, WreqUpstreamClient};
use tguard_router::{ProxyState, proxy_router};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("tguard failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    // Merge order: CLI > ENV.
    let mut patch = cli::env_patch();
    patch.overlay(cli.into_patch());
    let config = patch.into_config();

    if config.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; analysis requests will fail until it is");
    }
    info!(host = %config.host, port = config.port, "config loaded");

    let upstream = WreqUpstreamClient::new(UpstreamClientConfig::from_config(&config))?;
    let upstream: Arc<dyn UpstreamClient> = Arc::new(upstream);

    let bind = format!("{}:{}", config.host, config.port);
    let app = proxy_router(ProxyState {
        config: Arc::new(config),
        upstream,
    });

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
