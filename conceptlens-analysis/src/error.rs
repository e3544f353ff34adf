//! Error types for conceptlens-analysis
//!
//! Every handler error renders as `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conceptlens_common::Error as CommonError;
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller does not own the resource (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409), e.g. duplicate submission
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// conceptlens-common error
    #[error("Common error: {0}")]
    Common(#[from] CommonError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Common(err) => match err {
                CommonError::NotFound(_) => StatusCode::NOT_FOUND,
                CommonError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                CommonError::Forbidden(_) => StatusCode::FORBIDDEN,
                CommonError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::FORBIDDEN => "FORBIDDEN",
            StatusCode::CONFLICT => "CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Common(
                CommonError::NotFound(msg)
                | CommonError::InvalidInput(msg)
                | CommonError::Forbidden(msg)
                | CommonError::Conflict(msg),
            ) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
