//! Error types for passage operations

use std::time::Duration;

/// Main error type for passage operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum PassageError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("No response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PassageError {
    /// Whether this error invalidates the whole connection rather than a
    /// single exchange. Fatal errors fail every outstanding exchange.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ConnectionClosed)
    }
}

/// Errors surfaced by the transport collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("write failed: {0}")]
    Write(String),

    #[error("connection closed")]
    Closed,
}

// Implement From conversions for common error types

impl From<TransportError> for PassageError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Write(msg) => Self::Transport(msg),
            TransportError::Closed => Self::ConnectionClosed,
        }
    }
}

/// Result type alias for passage operations
pub type Result<T> = std::result::Result<T, PassageError>;
