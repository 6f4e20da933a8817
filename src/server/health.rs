// src/server/health.rs

//! Liveness and readiness endpoint for the agent and controller processes.

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::{error, info};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "healthy")
}

async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

/// Runs the health endpoint until shutdown. A bind failure is logged, not
/// fatal; probes failing is the deployment's signal.
pub async fn run_health_server(bind_address: String, mut shutdown_rx: broadcast::Receiver<()>) {
    let Ok(addr) = SocketAddr::from_str(&bind_address) else {
        error!("invalid health bind address {bind_address:?}");
        return;
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));

    info!("health server listening on http://{addr}/healthz");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind health server on {addr}: {e}");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Health server shutting down.");
        })
        .await
    {
        error!("health server error: {e}");
    }
}
