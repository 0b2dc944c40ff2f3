// crates/server/src/main.rs
//! delineate server binary.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use delineate_observability::ObservabilityConfig;
use delineate_server::ratelimit::spawn_cleanup_task;
use delineate_server::{create_app, init_metrics, AppState, LogFormat, ServerConfig};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    let observability = delineate_observability::init(ObservabilityConfig {
        environment: config.app_env.as_str().to_string(),
        json_logs: config.log_format == LogFormat::Json,
        sentry_dsn: config.sentry_dsn.clone(),
        otlp_endpoint: config.otlp_endpoint.clone(),
        ..ObservabilityConfig::new("delineate-server")
    });

    config.validate().context("invalid configuration")?;
    init_metrics();

    let state = AppState::from_config(&config).await;
    spawn_cleanup_task(state.rate_limit.clone(), Duration::from_secs(60));
    tracing::info!(
        oracle = state.oracle.name(),
        delay_min_ms = config.download_delay_min_ms,
        delay_max_ms = config.download_delay_max_ms,
        delay_enabled = config.download_delay_enabled,
        request_timeout_ms = config.request_timeout_ms,
        rate_limit_window_ms = config.rate_limit_window_ms,
        rate_limit_max_requests = config.rate_limit_max_requests,
        environment = config.app_env.as_str(),
        sentry = observability.sentry_enabled(),
        "Configuration loaded"
    );

    let app = create_app(state);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "delineate server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
