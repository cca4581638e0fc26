use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use index::IndexError;
use matcher::MatchError;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type ServerResult<T> = Result<T, ServerError>;

/// Server error types
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

/// API error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ServerError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServerError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::Match(err) => match err {
                MatchError::Validation(_) => StatusCode::BAD_REQUEST,
                MatchError::Upstream(_) => StatusCode::BAD_GATEWAY,
                MatchError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            },
            ServerError::Index(err) => match err {
                IndexError::Busy => StatusCode::CONFLICT,
                IndexError::Upstream(_) | IndexError::Fetch { .. } => StatusCode::BAD_GATEWAY,
                IndexError::Snapshot(_) => StatusCode::SERVICE_UNAVAILABLE,
                IndexError::Configuration(_) | IndexError::Io(_) | IndexError::Serde(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Authentication(_) => "AUTH_FAILED",
            ServerError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ServerError::BadRequest(_) => "BAD_REQUEST",
            ServerError::Match(err) => err.code(),
            ServerError::Index(err) => match err {
                IndexError::Configuration(_) => "CONFIGURATION_ERROR",
                IndexError::Busy => "BUSY",
                IndexError::Upstream(_) => "UPSTREAM_ERROR",
                IndexError::Fetch { .. } => "FETCH_ERROR",
                IndexError::Snapshot(_) => "SNAPSHOT_ERROR",
                IndexError::Io(_) | IndexError::Serde(_) => "INTERNAL_ERROR",
            },
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code().to_string();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = %error_code, error = %message, "request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for ServerError {
    fn from(err: JsonRejection) -> Self {
        ServerError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(err: QueryRejection) -> Self {
        ServerError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(err: PathRejection) -> Self {
        ServerError::BadRequest(err.body_text())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("JSON parse error: {err}"))
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}
