//! SSE-C Gateway Server
//!
//! Streams uploads into and downloads out of an S3-compatible bucket with
//! server-side encryption under a customer-provided key.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssec_gateway::config::Config;
use ssec_gateway::encryption::KeyMaterial;
use ssec_gateway::routes;
use ssec_gateway::state::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ssec_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("Starting SSE-C Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Bucket: {}", config.storage.bucket);
    tracing::info!(
        part_size = config.transfer.part_size,
        concurrency = config.transfer.concurrency,
        max_upload_bytes = ?config.transfer.max_upload_bytes,
        "Transfer settings"
    );

    let keys = KeyMaterial::from_base64(
        &config.encryption.key_base64,
        &config.encryption.key_md5_base64,
    )
    .context("invalid SSE-C key material")?;
    keys.log_integrity();

    let store = state::connect_store(&config).await;
    let addr = (config.server.host.clone(), config.server.port);
    let app = routes::router(AppState::new(config, store, Arc::new(keys)));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}:{}", addr.0, addr.1))?;
    tracing::info!("SSE-C Gateway listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server shutdown complete");
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
