// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use streamedge_core::FetchError;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Short title shown next to the message, e.g. "Not Found"
    fn title(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Error")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Serialize)]
struct ErrorBody {
    title: &'static str,
    message: String,
}

/// `{"success": false, "error": {"title": ..., "message": ...}}`
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            success: false,
            error: ErrorBody {
                title: self.title(),
                message: self.message,
            },
        });

        (status, body).into_response()
    }
}

/// Map fetch outcomes to HTTP statuses
impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::StreamUnresolved(_) => AppError::not_found("No stream with such name!"),
            FetchError::FragmentNotFound { fragment, .. } => {
                AppError::not_found(format!("No fragment {fragment} in this stream"))
            }
            FetchError::NotCacheable(fragment) => {
                AppError::bad_request(format!("Unsupported fragment type: {fragment}"))
            }
            FetchError::Transport(msg) => {
                tracing::warn!("Origin unreachable: {}", msg);
                AppError::bad_gateway("Origin unreachable")
            }
            FetchError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                AppError::internal("Internal server error")
            }
        }
    }
}

/// Convert anyhow errors to HTTP errors
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {}", err);
        AppError::internal("Internal server error")
    }
}
