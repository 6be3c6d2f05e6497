//! Error types for the cloud photo client.

use thiserror::Error;

/// Result type alias for cloud API operations.
pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors raised while talking to the cloud photo service.
#[derive(Debug, Error)]
pub enum CloudError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the cloud service
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication error (missing or invalid token, unanswered challenge)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl CloudError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }
}

impl From<CloudError> for framesync_core::Error {
    fn from(err: CloudError) -> Self {
        use framesync_core::Error;

        match err {
            CloudError::Http(e) if e.is_connect() || e.is_timeout() => Error::Connection(e.to_string()),
            CloudError::Http(e) => Error::Transfer(e.to_string()),
            CloudError::Json(e) => Error::Protocol(e.to_string()),
            CloudError::Api { status: 401 | 403, message } => Error::Authentication(message),
            CloudError::Api { status: 404, message } => Error::NotFound(message),
            CloudError::Api { status, message } => {
                Error::Transfer(format!("cloud API returned {}: {}", status, message))
            }
            CloudError::Auth(message) => Error::Authentication(message),
        }
    }
}
