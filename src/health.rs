//! Health check and stats HTTP endpoints for deployment platform monitoring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::metrics::{MetricsSnapshot, ModerationMetrics};
use crate::tracker::OffenseTracker;

/// Shared state for the health server.
#[derive(Clone)]
pub struct HealthState {
    pub metrics: Arc<ModerationMetrics>,
    pub tracker: Arc<OffenseTracker>,
}

/// Body of `GET /stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub hate_rate: f64,
    pub tracked_users: usize,
    pub build_timestamp: &'static str,
    pub git_commit: &'static str,
}

/// Build the health router.
pub fn build_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Start the health check HTTP server.
pub async fn start_health_server(port: u16, state: HealthState) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port = port, "Starting health check server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, port = port, "Failed to bind health check port");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, build_router(state)).await {
        tracing::error!(error = %e, "Health check server failed");
    }
}

/// Health check handler - returns 200 OK.
async fn health_handler() -> &'static str {
    "OK"
}

async fn stats_handler(State(state): State<HealthState>) -> Json<StatsResponse> {
    let counters = state.metrics.snapshot();
    Json(StatsResponse {
        hate_rate: counters.hate_rate(),
        counters,
        tracked_users: state.tracker.tracked_users(),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        git_commit: env!("GIT_COMMIT"),
    })
}

/// Spawn the health check server as a background task.
pub fn spawn_health_server(port: u16, state: HealthState) {
    tokio::spawn(async move {
        start_health_server(port, state).await;
    });
}
