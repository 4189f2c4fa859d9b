//! Transport abstraction shared by the concrete transports.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;

/// Transport protocol kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Tcp,
}

impl TransportKind {
    /// Whether the transport retransmits and orders on its own.
    ///
    /// The transaction layer suppresses its retransmission and linger
    /// timers over reliable transports.
    pub fn is_reliable(&self) -> bool {
        matches!(self, TransportKind::Tcp)
    }

    /// Uppercase name as it appears in Via headers
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The payload was handed to the socket in full
    Sent,
    /// The socket was not writable. Stream transports park the unsent
    /// tail for [`Transport::flush_pending`]; datagram transports drop
    /// the packet and leave recovery to protocol retransmission.
    WouldBlock,
}

/// Event pushed by a transport onto the ingress channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A chunk of bytes arrived. For UDP each event carries exactly one
    /// datagram; for TCP it carries whatever the read returned, which
    /// may be part of a message or several messages.
    Received {
        kind: TransportKind,
        source: SocketAddr,
        destination: SocketAddr,
        payload: Bytes,
    },
    /// A stream peer closed its side of the connection
    PeerClosed {
        kind: TransportKind,
        peer: SocketAddr,
    },
    /// A transport-level failure worth surfacing to the layer above
    Error {
        kind: TransportKind,
        peer: Option<SocketAddr>,
        error: String,
    },
}

/// A bound transport instance.
///
/// Receiving is push-based: each transport runs its own receive task
/// and delivers [`TransportEvent`]s over the unbounded channel it was
/// given at bind time. Sending is non-blocking so the reactor thread
/// can call it inline without ever waiting on a socket.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Protocol kind of this transport
    fn kind(&self) -> TransportKind;

    /// Local address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Try to send a payload without blocking
    fn try_send(&self, destination: SocketAddr, payload: &[u8]) -> Result<SendOutcome>;

    /// Retry writes parked by earlier [`SendOutcome::WouldBlock`] outcomes
    fn flush_pending(&self) -> Result<()>;

    /// Stop the transport; receive loops wind down
    fn close(&self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}
