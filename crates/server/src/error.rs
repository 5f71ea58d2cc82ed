//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use packyard_core::ErrorKind;
use serde::Serialize;

/// Response body for publish requests: `{"response": "..."}`.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub response: String,
}

impl PublishResponse {
    pub fn success() -> Self {
        Self {
            response: "success".to_string(),
        }
    }

    pub fn access_denied() -> Self {
        Self {
            response: "ACCESS_DENIED".to_string(),
        }
    }
}

/// Publish pipeline failure.
///
/// Only the kind reaches the client; the message is for logs.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PublishError {
    kind: ErrorKind,
    message: String,
}

impl PublishError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadAuthorization, message)
    }

    pub fn bad_package(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadPackage, message)
    }

    pub fn already_published(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyPublished, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, message)
    }

    pub fn malformed_package(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedPackage, message)
    }

    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UploadFailed, message)
    }

    pub fn uncaught(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UncaughtException, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::BadAuthorization => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<packyard_metadata::MetadataError> for PublishError {
    fn from(e: packyard_metadata::MetadataError) -> Self {
        Self::uncaught(format!("metadata error: {e}"))
    }
}

impl From<packyard_storage::StorageError> for PublishError {
    fn from(e: packyard_storage::StorageError) -> Self {
        Self::uncaught(format!("storage error: {e}"))
    }
}

impl From<packyard_core::Error> for PublishError {
    fn from(e: packyard_core::Error) -> Self {
        Self::uncaught(format!("core error: {e}"))
    }
}

impl IntoResponse for PublishError {
    fn into_response(self) -> Response {
        let body = match self.kind {
            ErrorKind::BadAuthorization => PublishResponse::access_denied(),
            kind => PublishResponse {
                response: kind.as_str().to_string(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// Admin API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] packyard_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] packyard_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] packyard_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "core_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                packyard_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                packyard_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                packyard_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Admin request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
