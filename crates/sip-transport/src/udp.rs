use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::transport::{SendOutcome, Transport, TransportEvent, TransportKind};

/// Maximum UDP payload (65535 minus IP and UDP headers)
pub const MAX_UDP_PACKET_SIZE: usize = 65_507;
// Buffer size for receiving datagrams
const UDP_BUFFER_SIZE: usize = 65_535;

/// UDP transport for SIP messages
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    closed: AtomicBool,
    ingress_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl UdpTransport {
    /// Binds a UDP transport and starts its receive loop. Incoming
    /// datagrams are pushed onto `ingress_tx`, one event per datagram.
    pub async fn bind(
        addr: SocketAddr,
        ingress_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = socket.local_addr()?;
        info!("SIP UDP transport bound to {}", local_addr);

        let transport = UdpTransport {
            inner: Arc::new(UdpTransportInner {
                socket,
                closed: AtomicBool::new(false),
                ingress_tx,
            }),
        };
        transport.spawn_receive_loop(local_addr);
        Ok(transport)
    }

    // Spawns a task that pushes received datagrams onto the ingress channel
    fn spawn_receive_loop(&self, local_addr: SocketAddr) {
        let transport = self.clone();
        tokio::spawn(async move {
            let inner = &transport.inner;
            let mut buffer = vec![0u8; UDP_BUFFER_SIZE];

            while !inner.closed.load(Ordering::Relaxed) {
                let (len, src) = match inner.socket.recv_from(&mut buffer).await {
                    Ok((len, src)) => (len, src),
                    Err(e) => {
                        if inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        error!("error receiving UDP packet: {}", e);
                        let event = TransportEvent::Error {
                            kind: TransportKind::Udp,
                            peer: None,
                            error: format!("receive failed: {}", e),
                        };
                        if inner.ingress_tx.send(event).is_err() {
                            break;
                        }
                        continue;
                    }
                };

                trace!("received {} bytes from {}", len, src);
                let event = TransportEvent::Received {
                    kind: TransportKind::Udp,
                    source: src,
                    destination: local_addr,
                    payload: Bytes::copy_from_slice(&buffer[..len]),
                };
                if inner.ingress_tx.send(event).is_err() {
                    // Ingress side is gone, nothing left to deliver to
                    break;
                }
            }
            debug!("UDP receive loop for {} exited", local_addr);
        });
    }
}

impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.socket.local_addr().map_err(Error::from)
    }

    fn try_send(&self, destination: SocketAddr, payload: &[u8]) -> Result<SendOutcome> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if payload.len() > MAX_UDP_PACKET_SIZE {
            return Err(Error::PacketTooLarge(payload.len(), MAX_UDP_PACKET_SIZE));
        }
        match self.inner.socket.try_send_to(payload, destination) {
            Ok(_) => Ok(SendOutcome::Sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendOutcome::WouldBlock),
            Err(e) => Err(Error::SendFailed(destination, e)),
        }
    }

    fn flush_pending(&self) -> Result<()> {
        // Datagrams are never queued; a blocked send is covered by the
        // transaction layer's retransmissions.
        Ok(())
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(addr) = self.inner.socket.local_addr() {
            write!(f, "UdpTransport({})", addr)
        } else {
            write!(f, "UdpTransport(<closed>)")
        }
    }
}
