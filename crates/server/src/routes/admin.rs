//! Index lifecycle operations. Mounted behind the API key middleware.

use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use index::{IndexError, IndexLifecycleManager, IndexOperation, LifecycleState, OperationPermit};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

/// `GET /admin/index`
pub async fn index_status(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.lifecycle.status())
}

/// Claim the in-flight slot before answering, then run the operation in the
/// background under that claim. A second request is refused with 409 here
/// rather than queued.
fn spawn_operation<F, Fut>(
    lifecycle: &Arc<IndexLifecycleManager>,
    operation: IndexOperation,
    run: F,
) -> ServerResult<()>
where
    F: FnOnce(Arc<IndexLifecycleManager>, OperationPermit) -> Fut,
    Fut: Future<Output = Result<LifecycleState, IndexError>> + Send + 'static,
{
    let permit = lifecycle.try_begin(operation)?;
    let task = run(lifecycle.clone(), permit);
    tokio::spawn(async move {
        match task.await {
            Ok(state) => tracing::info!(%operation, state = ?state, "index operation finished"),
            Err(err) => tracing::warn!(%operation, error = %err, "index operation not run"),
        }
    });
    Ok(())
}

/// `POST /admin/rebuild`: 202 once the rebuild is started, 409 while busy.
pub async fn rebuild(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    spawn_operation(
        &state.lifecycle,
        IndexOperation::Rebuild,
        |lifecycle, permit| async move { lifecycle.rebuild_with(permit).await },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "operation": "rebuild" })),
    ))
}

/// `POST /admin/restore`: restore the configured dependency bundle.
pub async fn restore(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    let bundle = state.config.bundle.clone().ok_or_else(|| {
        ServerError::BadRequest("no dependency bundle is configured".to_string())
    })?;
    spawn_operation(
        &state.lifecycle,
        IndexOperation::Restore,
        |lifecycle, permit| async move { lifecycle.restore_with(permit, &bundle).await },
    )?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "operation": "restore" })),
    ))
}

/// `POST /admin/verify`: read-only check of the served snapshot.
pub async fn verify(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let verified = state.lifecycle.verify().await;
    Json(json!({
        "verified": verified,
        "state": state.lifecycle.state(),
    }))
}
