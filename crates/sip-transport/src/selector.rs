//! Registry of live transports.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::{SendOutcome, Transport, TransportKind};

/// Owns the registered transports and routes outbound sends by kind.
///
/// The reactor holds exactly one selector; nothing else touches the
/// sockets for sending once they are registered here.
#[derive(Default)]
pub struct TransportSelector {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportSelector {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    /// Registers a transport. The first registration of a kind wins
    /// route lookups for that kind.
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    /// Returns the transport serving `kind`
    pub fn get(&self, kind: TransportKind) -> Option<&Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.kind() == kind)
    }

    /// Routes a send to the transport serving `kind`
    pub fn try_send(
        &self,
        kind: TransportKind,
        destination: SocketAddr,
        payload: &[u8],
    ) -> Result<SendOutcome> {
        let transport = self.get(kind).ok_or(Error::NoTransport(kind))?;
        transport.try_send(destination, payload)
    }

    /// Retries parked writes on every transport. Failures are logged;
    /// one stuck transport does not stop the others.
    pub fn flush_pending(&self) {
        for transport in &self.transports {
            if let Err(e) = transport.flush_pending() {
                warn!("flush on {} transport failed: {}", transport.kind(), e);
            }
        }
    }

    /// Closes every registered transport
    pub fn close_all(&self) {
        for transport in &self.transports {
            transport.close();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
