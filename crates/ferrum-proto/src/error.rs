//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding or parsing IRC lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying transport error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the RFC 2812 512-byte limit.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong {
        /// Observed length including CRLF.
        actual: usize,
        /// The enforced limit.
        limit: usize,
    },

    /// A line was not valid UTF-8.
    #[error("invalid utf-8 at byte {0}")]
    InvalidUtf8(usize),

    /// The line did not parse as an IRC message.
    #[error("failed to parse command: {0:?}")]
    ParseCommand(String),

    /// A known command was given the wrong number of arguments.
    #[error("{0}: not enough arguments")]
    NotEnoughArgs(&'static str),

    /// The prefix token was malformed.
    #[error("malformed prefix: {0:?}")]
    BadPrefix(String),
}
