//! mip-ingest - Media Ingestion microservice
//!
//! Accepts media by thin upload, server-side URL import or browser-direct
//! transfer, hands it to the processing provider through the resumable
//! upload handshake, waits for readiness and records the result. Every
//! ingestion request is answered with an SSE progress stream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;

use mip_common::config::resolve_config_path;
use mip_common::logging::init_tracing;
use mip_ingest::config::{resolve_provider_api_key, IngestConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME};
use mip_ingest::services::ProviderClient;
use mip_ingest::AppState;

/// Command-line arguments for mip-ingest
#[derive(Parser, Debug)]
#[command(name = "mip-ingest")]
#[command(about = "Media ingestion microservice")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long, env = "MIP_BIND")]
    bind: Option<String>,

    /// SQLite database path, overrides the config file
    #[arg(short, long, env = "MIP_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_ENV_VAR, CONFIG_FILE_NAME);
    let mut config = IngestConfig::load(config_path.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }

    init_tracing(&config.logging, "mip_ingest")?;

    info!("Starting mip-ingest (Media Ingestion) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    let api_key = resolve_provider_api_key(&config.provider)?;
    let provider = ProviderClient::new(&config.provider, api_key)?;
    info!("Provider: {}", config.provider.base_url);

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = mip_ingest::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let state = AppState::from_config(db_pool, Arc::new(provider), &config)?;
    let app = mip_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("Listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
