//! Transport error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::transport::TransportKind;

/// Errors raised by the transport layer
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to bind a socket
    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, #[source] io::Error),

    /// Failed to establish an outbound connection
    #[error("failed to connect to {0}: {1}")]
    ConnectFailed(SocketAddr, #[source] io::Error),

    /// A send failed with a hard I/O error
    #[error("failed to send to {0}: {1}")]
    SendFailed(SocketAddr, #[source] io::Error),

    /// Datagram payload exceeds the transport limit
    #[error("packet of {0} bytes exceeds the {1} byte limit")]
    PacketTooLarge(usize, usize),

    /// No established connection to the destination
    #[error("no connection to {0}")]
    NoConnection(SocketAddr),

    /// No transport registered for the requested kind
    #[error("no {0} transport registered")]
    NoTransport(TransportKind),

    /// The transport has been closed
    #[error("transport closed")]
    TransportClosed,

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;
