//! SIP transport layer implementation for the ringline stack
//!
//! This crate provides the wire transports for SIP messages: UDP
//! datagrams and TCP streams. Transports push the raw bytes they
//! receive onto an unbounded ingress channel and expose non-blocking
//! sends, so the transaction reactor never waits on a socket. Framing
//! and parsing happen above this crate, on the reactor thread.

mod error;
pub mod selector;
pub mod tcp;
pub mod transport;
pub mod udp;

pub use error::{Error, Result};
pub use selector::TransportSelector;
pub use tcp::TcpTransport;
pub use transport::{SendOutcome, Transport, TransportEvent, TransportKind};
pub use udp::{UdpTransport, MAX_UDP_PACKET_SIZE};

/// Bind a UDP transport with a fresh ingress channel
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(
    UdpTransport,
    tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
)> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let transport = UdpTransport::bind(addr, tx).await?;
    Ok((transport, rx))
}

/// Bind a TCP transport with a fresh ingress channel
pub async fn bind_tcp(
    addr: std::net::SocketAddr,
) -> Result<(
    TcpTransport,
    tokio::sync::mpsc::UnboundedReceiver<TransportEvent>,
)> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let transport = TcpTransport::bind(addr, tx).await?;
    Ok((transport, rx))
}

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::{
        bind_tcp, bind_udp, Error, Result, SendOutcome, TcpTransport, Transport, TransportEvent,
        TransportKind, TransportSelector, UdpTransport,
    };
}
