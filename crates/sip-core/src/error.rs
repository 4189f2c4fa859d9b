use std::io;

use thiserror::Error;

/// Errors produced while parsing or assembling SIP messages.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid SIP method
    #[error("Invalid SIP method")]
    InvalidMethod,

    /// Invalid SIP version
    #[error("Invalid SIP version")]
    InvalidVersion,

    /// Invalid status code
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Malformed request or status line
    #[error("Invalid start line: {0}")]
    InvalidStartLine(String),

    /// Invalid URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// A header whose content could not be parsed into its typed form.
    /// Scoped to that single header; the rest of the message stays usable.
    #[error("Invalid {name} header at byte {offset}")]
    InvalidHeader { name: String, offset: usize },

    /// Boundary scan failure. `offset` is the number of leading buffered
    /// bytes proven unusable; stream callers discard up to it to resync.
    #[error("Preparse failed at byte {offset}: {reason}")]
    Preparse { offset: usize, reason: &'static str },

    /// A configured parser limit was exceeded
    #[error("Message limit exceeded: {0}")]
    LimitExceeded(&'static str),

    /// A datagram ended before the message did
    #[error("Incomplete message: {0}")]
    Incomplete(&'static str),

    /// Low-level parser failure
    #[error("Parser error: {0}")]
    Parser(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for SIP operations
pub type Result<T> = std::result::Result<T, Error>;

impl<I: std::fmt::Debug> From<nom::Err<nom::error::Error<I>>> for Error {
    fn from(err: nom::Err<nom::error::Error<I>>) -> Self {
        Error::Parser(format!("{:?}", err))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parser(s.to_string())
    }
}
