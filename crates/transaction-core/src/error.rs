use thiserror::Error;

use crate::transaction::TransactionKey;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in SIP transaction handling
#[derive(Error, Debug)]
pub enum Error {
    /// Error originating from the sip-core crate (parsing, building messages)
    #[error("SIP core error: {0}")]
    Core(#[from] ringline_sip_core::Error),

    /// Error originating from the transport layer
    #[error("SIP transport error: {0}")]
    Transport(String),

    /// Transaction not found for the given key
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionKey),

    /// Transaction with the given key already exists
    #[error("transaction already exists: {0}")]
    TransactionExists(TransactionKey),

    /// A response was requested that the transaction state does not allow
    #[error("invalid transaction state transition: {0}")]
    InvalidStateTransition(String),

    /// A message lacks a header the transaction layer requires
    #[error("message is missing a {0} header")]
    MissingHeader(&'static str),

    /// Internal channel closed (engine stopped or receiver dropped)
    #[error("engine channel closed")]
    ChannelClosed,

    /// Other miscellaneous errors
    #[error("{0}")]
    Other(String),
}

// Transport errors carry a source io::Error and are not cloneable, so
// they cross the boundary as text.
impl From<ringline_sip_transport::Error> for Error {
    fn from(e: ringline_sip_transport::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
