use crate::error::ServerError;
use crate::state::ServerState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

/// Probe paths whose request logs are kept at debug level.
const QUIET_PATHS: [&str; 2] = ["/healthcheck", "/hc"];

/// Request ID carried in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Key from `X-API-Key`, or from `Authorization: Bearer <key>`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Guards the admin routes. With no keys configured every request is refused.
pub async fn api_key_auth(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if state.config.api_keys.is_empty() {
        return Err(ServerError::Authentication(
            "admin routes are disabled: no API keys configured".to_string(),
        ));
    }
    let Some(key) = presented_key(request.headers()) else {
        return Err(ServerError::Authentication(
            "API key required in 'X-API-Key' or 'Authorization: Bearer <key>'".to_string(),
        ));
    };
    if !state.is_valid_api_key(key) {
        tracing::warn!(path = %request.uri().path(), "rejected admin request with unknown key");
        return Err(ServerError::Authentication("Invalid API key".to_string()));
    }
    if !state.check_rate_limit(key) {
        return Err(ServerError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}

/// Request ID injection middleware
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();
    let quiet = QUIET_PATHS.contains(&uri.path());

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if quiet {
        tracing::debug!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms,
            request_id = %request_id,
            "Request completed"
        );
    } else {
        tracing::info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms,
            request_id = %request_id,
            "Request completed"
        );
    }

    response
}
