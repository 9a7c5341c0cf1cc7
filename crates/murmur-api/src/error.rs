use axum::{
    Json,
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::upload::validator::UploadRejection;

/// Coarse classification used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    Upload,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            Self::Validation | Self::Upload => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited => "RATE_LIMITED",
            Self::Upload => "UPLOAD_REJECTED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Every handler returns this error type; it is rendered in one place as
/// `{"error": <message>, "code": <KIND>}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error(transparent)]
    Upload(#[from] UploadRejection),

    /// Persisting an accepted file failed.
    #[error("Upload failed: {0}")]
    UploadFailed(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Upload(_) => ErrorKind::Upload,
            Self::UploadFailed(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }
}

// Extractor rejections are client input errors. Handlers take their bodies
// and queries through `WithRejection<_, AppError>` so these render like any
// other validation failure.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match &self {
            Self::UploadFailed(e) => {
                error!(error = ?e, "Failed to persist upload");
                "Upload failed".to_string()
            }
            Self::Internal(e) => {
                error!(error = ?e, "Internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": kind.code(),
        });

        (kind.status(), Json(body)).into_response()
    }
}
