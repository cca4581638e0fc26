use crate::state::ServerState;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use index::SnapshotGate;
use serde_json::json;
use std::sync::Arc;

const SERVICE_UP: &str = "Service is up!";

/// `GET /`
pub async fn root_status() -> impl IntoResponse {
    Json(json!({ "msg": SERVICE_UP }))
}

/// `GET /healthcheck`: liveness only, never touches the toolkit.
pub async fn health_check() -> impl IntoResponse {
    Json("UP")
}

/// `GET /status`: index lifecycle and toolkit status.
///
/// A toolkit that cannot be reached is reported in the body; the route
/// itself still answers 200 while the process is up.
pub async fn server_status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let index = state.lifecycle.status();
    let toolkit = state.dispatcher.toolkit().status().await;

    let mut body = json!({
        "msg": SERVICE_UP,
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.uptime().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "index": index,
    });
    match toolkit {
        Ok(status) => body["toolkit"] = status,
        Err(err) => {
            tracing::warn!(error = %err, "toolkit status unavailable");
            body["toolkit"] = serde_json::Value::Null;
            body["toolkitError"] = json!(err.to_string());
        }
    }
    Json(body)
}

/// `GET /ready`: 200 while a snapshot is served, 503 otherwise.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> Response {
    match state.lifecycle.serving() {
        Some(snapshot) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "snapshot": snapshot })),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not-ready",
                "state": state.lifecycle.state(),
            })),
        )
            .into_response(),
    }
}

/// `GET /metrics`: Prometheus text when the exporter is installed.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> Response {
    match &state.prometheus {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => Json(json!({ "uptime_seconds": state.uptime().as_secs() })).into_response(),
    }
}
