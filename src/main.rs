//! seatmap-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST, SSE and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use seatmap_gateway::app_state::AppState;
use seatmap_gateway::build_app;
use seatmap_gateway::config::{InventoryConfig, LogFormat};
use seatmap_gateway::domain::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = InventoryConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting seatmap-gateway");

    // Build domain and service layers
    let (app_state, background) = AppState::bootstrap(&config, Arc::new(SystemClock))
        .await
        .context("failed to build inventory")?;

    // Build router
    let app = build_app(app_state, config.request_timeout);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    background.shutdown().await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
