//! HTTP API for health checks, Prometheus metrics, and operations

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use overseer_core::{ComponentStatus, Orchestrator, SubmitError, TaskSpec};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.orchestrator.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.orchestrator.health().readiness().await;

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

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Aggregated system report from the latest snapshot
async fn report(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.report() {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no performance snapshot captured yet" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ActionsQuery {
    #[serde(default = "default_actions_limit")]
    limit: usize,
}

fn default_actions_limit() -> usize {
    20
}

/// Recent mitigation actions, newest first
async fn actions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ActionsQuery>,
) -> impl IntoResponse {
    Json(state.orchestrator.recent_actions(query.limit))
}

/// Publish one event onto a topic's channel
async fn publish_event(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    if state.orchestrator.is_stopping() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "daemon is shutting down" })),
        )
            .into_response();
    }
    if !state.orchestrator.has_topic(&topic) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown topic '{}'", topic) })),
        )
            .into_response();
    }

    if state.orchestrator.publish(&topic, payload) {
        (
            StatusCode::ACCEPTED,
            Json(json!({ "accepted": true, "topic": topic })),
        )
            .into_response()
    } else if state.orchestrator.is_stopping() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "daemon is shutting down" })),
        )
            .into_response()
    } else {
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "accepted": false, "error": "channel refused the event" })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    kind: String,
    #[serde(default)]
    params: Value,
}

/// Submit a task and wait for its result
async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state
        .orchestrator
        .submit(TaskSpec::new(&request.kind, request.params))
    {
        Ok(handle) => {
            let result = handle.wait().await;
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(err @ SubmitError::ResourceExhausted) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(err @ SubmitError::ShuttingDown) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/report", get(report))
        .route("/api/v1/actions", get(actions))
        .route("/api/v1/events/:topic", post(publish_event))
        .route("/api/v1/tasks", post(submit_task))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
