mod bootstrap;
mod health;
mod routes;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use issuebot_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;
use tokio::time::Instant;

fn init_logging(config: &AppConfig) {
    use issuebot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config first so logging honours [logging] from the very first event
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let state = routes::AppState::new(app.coordinator.clone());
    let router = routes::router(state.clone()).merge(health::router(app.store.clone()));

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    let server = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.notified().await })
            .into_future(),
    );

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        backend = %app.store.backend(),
        "issuebot-server listening"
    );

    wait_for_shutdown().await?;
    shutdown.notify_one();
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = app.config.server.graceful_shutdown_secs,
        "issuebot-server draining connections"
    );

    // one window covers both open connections and acknowledged follow-ups
    let deadline =
        Instant::now() + Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout_at(deadline, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "graceful shutdown window elapsed with connections still open"
        ),
    }

    let report =
        state.follow_ups().drain(deadline.saturating_duration_since(Instant::now())).await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        completed = report.outcomes.len(),
        panicked = report.panicked,
        abandoned = report.abandoned,
        "issuebot-server stopped"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
