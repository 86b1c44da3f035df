//! API error types.

use crate::releases::ReleaseError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("storage error: {0}")]
    Storage(#[from] updraft_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] updraft_metadata::MetadataError),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal_error",
            Self::Release(e) if e.is_integrity_fault() => "internal_error",
            Self::Release(e) => e.reason(),
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Multipart(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Release(e) => match e {
                ReleaseError::InvalidInput(_)
                | ReleaseError::MissingField(_)
                | ReleaseError::InvalidPlatform(_)
                | ReleaseError::InvalidBundle(_) => StatusCode::BAD_REQUEST,
                ReleaseError::AssetNotFound(_)
                | ReleaseError::NoActiveRelease(_)
                | ReleaseError::UnknownRelease(_) => StatusCode::NOT_FOUND,
                ReleaseError::NoOpRollback(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Storage(_) | Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Body limit violations surface here as 413.
            Self::Multipart(e) => e.status(),
        }
    }

    /// Message sent to the caller.
    ///
    /// Integrity faults are logged where they are detected and only a generic
    /// message leaves the server, so archive layout is never exposed.
    fn public_message(&self) -> String {
        match self {
            Self::Release(e) if e.is_integrity_fault() => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
