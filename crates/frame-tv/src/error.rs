//! Error types for the Frame TV data channel.

use thiserror::Error;

/// Violations of the d2d socket framing or connection negotiation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Fewer than `expected` bytes arrived before the read deadline.
    #[error("timed out after {timeout_ms} ms waiting for {expected} bytes (got {received})")]
    Timeout {
        expected: usize,
        received: usize,
        timeout_ms: u64,
    },

    /// The peer closed the socket before `expected` bytes arrived.
    #[error("short read: expected {expected} bytes, socket closed after {received}")]
    ShortRead { expected: usize, received: usize },

    /// Header length prefix is zero or implausibly large.
    #[error("invalid header length prefix: {0}")]
    InvalidLengthPrefix(u32),

    #[error("malformed frame header: {0}")]
    InvalidHeader(String),

    #[error("malformed connection info: {0}")]
    InvalidConnectionInfo(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader(message.into())
    }

    pub fn invalid_connection_info(message: impl Into<String>) -> Self {
        Self::InvalidConnectionInfo(message.into())
    }
}

impl From<ProtocolError> for framesync_core::Error {
    fn from(err: ProtocolError) -> Self {
        framesync_core::Error::Protocol(err.to_string())
    }
}
