// crates/server/src/error.rs
use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use delineate_types::FileIdError;

use crate::jobs::EngineError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// Attached to 5xx responses so the trace middleware can log what actually
/// failed while the client only sees a generic message.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub message: String,
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid file_id: {0}")]
    InvalidFileId(#[from] FileIdError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Download job failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::InvalidFileId(err) => {
                tracing::warn!(error = %err, "Invalid file_id");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Invalid file_id", err.to_string()),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Engine(err) => {
                tracing::error!(error = %err, "Download job task failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        let mut response = (status, Json(error_response)).into_response();
        if status.is_server_error() {
            response.extensions_mut().insert(FailureReport {
                message: self.to_string(),
            });
        }
        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` extractor whose rejections become 400 `ErrorResponse`s.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
