//! Protocol error types

use thiserror::Error;

/// Errors that can occur while reading or writing protocol lines
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An incoming line exceeded the maximum length before a terminator arrived
    #[error("Line too long: more than {max} bytes without a newline")]
    LineTooLong { max: usize },

    /// An outgoing line contained an embedded newline
    #[error("Embedded newline in outgoing line")]
    EmbeddedNewline,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
