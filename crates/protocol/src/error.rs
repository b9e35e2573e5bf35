//! Protocol error types

use thiserror::Error;

/// Errors from encoding or decoding wire lines
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Line exceeds the maximum accepted length
    #[error("Line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// Encoded output contained a newline, which would break framing
    #[error("Encoded message spans multiple lines")]
    EmbeddedNewline,
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
