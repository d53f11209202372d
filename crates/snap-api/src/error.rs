//! API error types.
//!
//! Errors are rendered in the callable-function envelope
//! `{"error": {"status", "message"}}`. Only three statuses ever reach a
//! caller; everything else collapses into `INTERNAL` with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use snap_pipeline::{CallerErrorKind, PipelineError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Canonical status name of the callable protocol.
    pub fn status_name(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn public_message(&self) -> String {
        match self {
            ApiError::Unauthenticated(_) => "The function must be called while authenticated.".to_string(),
            ApiError::InvalidArgument(msg) => msg.clone(),
            ApiError::Internal(_) => "INTERNAL".to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err.caller_kind() {
            CallerErrorKind::Unauthenticated => ApiError::Unauthenticated(err.to_string()),
            CallerErrorKind::InvalidArgument => match err {
                PipelineError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
                other => ApiError::InvalidArgument(other.to_string()),
            },
            CallerErrorKind::Internal => {
                error!(kind = err.kind_label(), error = %err, "createSnap failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                status: self.status_name(),
                message: self.public_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}
