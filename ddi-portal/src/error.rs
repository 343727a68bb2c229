//! API error type

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ddi_import::ImportError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request clashes with existing state (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or wrong webhook signature (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] ddi_common::Error),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(err) | ApiError::Import(ImportError::Store(err)) => match err {
                ddi_common::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ddi_common::Error::InvalidInput(_) | ddi_common::Error::Validation { .. } => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
            },
            ApiError::Import(ImportError::UnknownEntity(_)) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Import(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IMPORT_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Common(err) => err.to_string(),
            ApiError::Import(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, %message, "Request failed");
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

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
