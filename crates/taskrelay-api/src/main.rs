//! taskrelay-api: serve the task REST API until SIGINT/SIGTERM, then
//! drain the queue before exiting.

use anyhow::{Context, Result};
use std::sync::Arc;
use taskrelay_api::{AppState, router};
use taskrelay_core::observability::init_tracing;
use taskrelay_core::{RelayConfig, TaskOrchestrator};
use tracing::info;

const ENV_LISTEN_ADDR: &str = "TASKRELAY_LISTEN_ADDR";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env().context("reading configuration")?;
    init_tracing(&config.log_filter);

    let orchestrator = Arc::new(
        TaskOrchestrator::from_config(&config)
            .await
            .context("building orchestrator")?,
    );
    orchestrator.init_workers(config.workers)?;

    let addr = std::env::var(ENV_LISTEN_ADDR).unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, workers = config.workers, "listening");

    axum::serve(listener, router(AppState::new(Arc::clone(&orchestrator))))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    orchestrator.shutdown().await;
    info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "could not listen for Ctrl-C");
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
                tracing::error!(error = %err, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
