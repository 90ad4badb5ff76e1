use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure of a single page load.
///
/// Serializes as `{"code": "NETWORK_ERROR", "message": "..."}` so the
/// presentation layer can pick a retry affordance from the code alone.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "message")]
pub enum LoadError {
    /// Transient; retrying with the same boundary is safe.
    #[error("Network error: {0}")]
    #[serde(rename = "NETWORK_ERROR")]
    Network(String),

    /// Corrupt or foreign boundary token; the feed must restart from the top.
    #[error("Invalid cursor: {0}")]
    #[serde(rename = "INVALID_CURSOR")]
    InvalidCursor(String),

    #[error("Unknown error: {0}")]
    #[serde(rename = "UNKNOWN")]
    Unknown(String),
}

impl LoadError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        Self::InvalidCursor(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Only network failures are known to be safe to retry blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// A boundary token that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CursorError(pub String);

impl CursorError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<CursorError> for LoadError {
    fn from(err: CursorError) -> Self {
        Self::InvalidCursor(err.0)
    }
}

/// Live tail subscription failures. All of them end the current
/// subscription; the driver resubscribes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TailError {
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Subscriber lagged, {0} items skipped")]
    Lagged(u64),
}

/// Application error codes for structured error responses
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    UpstreamError,
    InternalError,
}

/// Structured error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Daemon error type with HTTP status mapping
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream_error(msg: impl Into<String>) -> Self {
        Self::UpstreamError(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::UpstreamError(_) => ErrorCode::UpstreamError,
            Self::InternalError(_) => ErrorCode::InternalError,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        tracing::error!(
            error_code = ?error_code,
            status = %status.as_u16(),
            message = %message,
            "request error"
        );

        let body = ErrorResponse {
            error: error_code,
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<LoadError> for AppError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::InvalidCursor(_) => Self::BadRequest(err.to_string()),
            _ => Self::UpstreamError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}
