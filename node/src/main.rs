use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ipfs_gateway_resolver::{CidResolver, IpfsHttpClient};
use ipfs_gateway_rpc::{start_server, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::{Cli, GatewayConfig, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(&cli)?;

    init_logging(&config)?;

    info!("Starting IPFS gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("IPFS node: {}", config.node_url);
    if config.stage_files {
        info!(
            "Staging fetched files in {} (removed after {:?})",
            config
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir)
                .display(),
            config.cleanup_delay
        );
    } else {
        info!("File staging disabled");
    }

    let client = IpfsHttpClient::new(&config.node_url)
        .with_context(|| format!("invalid IPFS node URL {}", config.node_url))?;
    let resolver = CidResolver::new(Arc::new(client), config.resolver_config());
    let state = AppState::new(resolver, config.node_url.clone());

    start_server(state, &config.bind_addr(), shutdown_signal()).await?;

    info!("IPFS gateway shutdown complete");
    Ok(())
}

fn init_logging(config: &GatewayConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    }
    .context("failed to initialise logging")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down IPFS gateway");
}
