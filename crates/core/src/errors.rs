//! Core error types for framesync.
//!
//! Transport-specific errors (WebSocket, TLS, HTTP) are converted into these
//! variants by the endpoint crates so the sync engine only ever sees one type.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type shared by every endpoint and the sync engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials were rejected or a further challenge is required.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote host could not be reached or the link dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A requested album or collection does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload or download failed at the application layer.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Framing or control-channel payload violated the wire contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The capability is not offered by this endpoint.
    #[error("Operation '{operation}' is not supported by endpoint '{endpoint}'")]
    Unsupported { endpoint: String, operation: String },

    /// `initialize()` has not completed on this endpoint.
    #[error("Endpoint '{0}' used before initialize()")]
    NotInitialized(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Secret store error: {0}")]
    Secret(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn unsupported(endpoint: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            endpoint: endpoint.into(),
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection(err.to_string())
    }
}
