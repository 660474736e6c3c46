//! Error types for welltick

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WelltickError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Request body too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Content store error: {0}")]
    ContentStore(String),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WelltickError {
    /// HTTP status this error surfaces as
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ContentStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::HashMismatch { .. }
            | Self::Integrity(_)
            | Self::Crypto(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to a client.
    ///
    /// Server-side failures collapse to a generic message; the detail stays in the log.
    pub fn public_message(&self) -> String {
        match self {
            Self::ContentStore(_) => "Content store unavailable, nothing was saved".to_string(),
            Self::Json(e) => format!("Invalid JSON: {}", e),
            e if e.status_code().is_server_error() => "Internal server error".to_string(),
            e => e.to_string(),
        }
    }
}

/// Result type alias for welltick operations
pub type Result<T> = std::result::Result<T, WelltickError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            WelltickError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WelltickError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WelltickError::ContentStore("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            WelltickError::Integrity("tag".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_errors_hide_detail() {
        let err = WelltickError::Internal("connection string leaked".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = WelltickError::NotFound("Health record not found".into());
        assert_eq!(err.public_message(), "Health record not found");
    }
}
