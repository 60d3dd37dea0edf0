//! HTTP API for health checks, Prometheus metrics, templates and drains

use crate::service::{DrainOutcome, SimulatorService};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use simulator_lib::drain::DrainError;
use simulator_lib::health::ComponentStatus;
use simulator_lib::models::pod_key;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub type AppState = Arc<SimulatorService>;

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let readiness = state.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %err, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.templates().await)
}

async fn template(State(state): State<AppState>, Path(node_group): Path<String>) -> impl IntoResponse {
    match state.template(&node_group).await {
        Some(info) => (StatusCode::OK, Json(serde_json::json!(info))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no template for node group {}", node_group) })),
        ),
    }
}

#[derive(Debug, Serialize)]
struct DrainResponse {
    node: String,
    drainable: bool,
    pods_to_move: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocking_pod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Drain verdict - 200 if drainable, 409 if a pod blocks, 404 for an
/// unknown node, 503 if no state is loaded, 500 on evaluation errors
async fn drain(State(state): State<AppState>, Path(node): Path<String>) -> impl IntoResponse {
    let mut response = DrainResponse {
        node,
        drainable: false,
        pods_to_move: Vec::new(),
        blocking_pod: None,
        reason: None,
        error: None,
    };
    let verdict = match state.drain(&response.node).await {
        DrainOutcome::Evaluated(verdict) => verdict,
        DrainOutcome::NotLoaded => {
            response.error = Some("cluster state not loaded yet".to_string());
            return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
        }
        DrainOutcome::UnknownNode => {
            response.error = Some(format!("node {} not found in cluster state", response.node));
            return (StatusCode::NOT_FOUND, Json(response));
        }
    };

    let status = match verdict {
        Ok(pods) => {
            response.drainable = true;
            response.pods_to_move = pods.iter().map(pod_key).collect();
            StatusCode::OK
        }
        Err(err @ DrainError::Blocked { .. }) => {
            if let Some(blocking) = err.blocking_pod() {
                response.blocking_pod = Some(pod_key(&blocking.pod));
                response.reason = Some(blocking.reason.to_string());
            }
            response.error = Some(err.to_string());
            StatusCode::CONFLICT
        }
        Err(err) => {
            response.error = Some(err.to_string());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(response))
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/templates", get(templates))
        .route("/templates/:node_group", get(template))
        .route("/drain/:node", get(drain))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
