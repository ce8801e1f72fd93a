//! Timer broker server binary.
//!
//! Builds the `axum` router (WebSocket upgrade + the public lookup route),
//! spawns the periodic cleanup ticker, and serves until signaled to shut
//! down.

use std::sync::Arc;

use anyhow::{Context, Result};
use timer_broker::{build_router, Broker, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();
    config.init_logging();

    log::info!(
        "timer-broker starting on {}:{} (environment: {:?})",
        config.host,
        config.port,
        config.environment
    );

    let addr = format!("{}:{}", config.host, config.port);
    let broker = Arc::new(Broker::new(config));
    let cleanup_ticker = broker.spawn_cleanup_ticker();

    let app = build_router(broker);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server loop failed")?;

    cleanup_ticker.abort();
    log::info!("timer-broker shut down");
    Ok(())
}

/// Resolves once SIGINT (or, on Unix, SIGTERM) is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    log::info!("shutdown signal received");
}
