//! overseerd - telemetry ingestion and adaptive scheduling daemon
//!
//! Runs the orchestrator (bounded channels, resource pool, monitor and
//! adaptive controller) in a single process and exposes the operational
//! HTTP surface.

use anyhow::Result;
use overseer_core::{Orchestrator, StructuredLogger};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod handlers;

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting overseerd");

    // Load configuration
    let config = config::DaemonConfig::load()?;
    info!(instance = %config.instance_name, "Daemon configured");

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(DAEMON_VERSION);

    // Wire the orchestrator and its built-in handlers
    let orchestrator = Arc::new(Orchestrator::new(config.orchestrator_config()));
    handlers::register_builtin(&orchestrator);
    orchestrator.start().await;
    logger.log_ready(orchestrator.topics().len(), orchestrator.unit_count());

    // Start the HTTP API
    let app_state = Arc::new(api::AppState::new(Arc::clone(&orchestrator)));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    orchestrator.stop().await;
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
