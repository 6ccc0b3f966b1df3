//! Error types for promptgate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for promptgate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for promptgate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request failed validation before any upstream work was done.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Uploaded file exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Provider '{provider}' failed: {message}")]
    Upstream { provider: String, message: String },

    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn upstream(provider: &str, message: impl Into<String>) -> Self {
        Error::Upstream {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Config(_) | Error::Upstream { .. } | Error::Http(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
