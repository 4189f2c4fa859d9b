use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{SendOutcome, Transport, TransportEvent, TransportKind};

// Read chunk size for stream sockets
const TCP_READ_BUFFER_SIZE: usize = 8192;

/// TCP transport for SIP messages.
///
/// Accepted and dialed connections land in one registry keyed by peer
/// address. Writes go through `try_write`; whatever the socket does not
/// take immediately is parked per connection and drained by
/// `flush_pending`, so byte order toward a peer is preserved. Sending
/// to a peer with no established connection is an error; connection
/// setup is the caller's concern, via [`TcpTransport::connect`].
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    local_addr: SocketAddr,
    closed: AtomicBool,
    ingress_tx: mpsc::UnboundedSender<TransportEvent>,
    connections: Mutex<HashMap<SocketAddr, TcpConnection>>,
}

struct TcpConnection {
    write_half: OwnedWriteHalf,
    pending: BytesMut,
}

impl TcpConnection {
    // Sends what the socket takes now and parks the rest. Nothing is
    // written ahead of bytes already in `pending`.
    fn send(&mut self, payload: &[u8]) -> io::Result<SendOutcome> {
        if !self.pending.is_empty() {
            self.pending.extend_from_slice(payload);
            return Ok(if self.drain_pending()? {
                SendOutcome::Sent
            } else {
                SendOutcome::WouldBlock
            });
        }

        let mut written = 0;
        while written < payload.len() {
            match self.write_half.try_write(&payload[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending.extend_from_slice(&payload[written..]);
                    return Ok(SendOutcome::WouldBlock);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(SendOutcome::Sent)
    }

    // Returns true once `pending` is empty
    fn drain_pending(&mut self) -> io::Result<bool> {
        while !self.pending.is_empty() {
            match self.write_half.try_write(&self.pending) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.pending.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl TcpTransport {
    /// Binds a listener and starts accepting connections. Received
    /// bytes from every connection flow onto `ingress_tx`.
    pub async fn bind(
        addr: SocketAddr,
        ingress_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;
        let local_addr = listener.local_addr()?;
        info!("SIP TCP transport bound to {}", local_addr);

        let transport = TcpTransport {
            inner: Arc::new(TcpTransportInner {
                local_addr,
                closed: AtomicBool::new(false),
                ingress_tx,
                connections: Mutex::new(HashMap::new()),
            }),
        };
        transport.spawn_accept_loop(listener);
        Ok(transport)
    }

    /// Dials a peer and registers the connection. Later sends to the
    /// returned address reuse it.
    pub async fn connect(&self, addr: SocketAddr) -> Result<SocketAddr> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::ConnectFailed(addr, e))?;
        let peer = stream.peer_addr()?;
        debug!("TCP connection established to {}", peer);
        self.register_connection(peer, stream);
        Ok(peer)
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    fn spawn_accept_loop(&self, listener: TcpListener) {
        let transport = self.clone();
        tokio::spawn(async move {
            loop {
                if transport.inner.closed.load(Ordering::Relaxed) {
                    break;
                }
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("accepted TCP connection from {}", peer);
                        transport.register_connection(peer, stream);
                    }
                    Err(e) => {
                        if transport.inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        warn!("TCP accept failed: {}", e);
                        let event = TransportEvent::Error {
                            kind: TransportKind::Tcp,
                            peer: None,
                            error: format!("accept failed: {}", e),
                        };
                        if transport.inner.ingress_tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(
                "TCP accept loop for {} exited",
                transport.inner.local_addr
            );
        });
    }

    fn register_connection(&self, peer: SocketAddr, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        {
            let mut connections = self.inner.connections.lock().unwrap();
            connections.insert(
                peer,
                TcpConnection {
                    write_half,
                    pending: BytesMut::new(),
                },
            );
        }
        self.spawn_read_loop(peer, read_half);
    }

    fn spawn_read_loop(&self, peer: SocketAddr, mut read_half: OwnedReadHalf) {
        let transport = self.clone();
        tokio::spawn(async move {
            let inner = &transport.inner;
            let mut buffer = vec![0u8; TCP_READ_BUFFER_SIZE];
            loop {
                match read_half.read(&mut buffer).await {
                    Ok(0) => {
                        debug!("TCP peer {} closed the connection", peer);
                        let _ = inner.ingress_tx.send(TransportEvent::PeerClosed {
                            kind: TransportKind::Tcp,
                            peer,
                        });
                        break;
                    }
                    Ok(len) => {
                        trace!("received {} bytes from {}", len, peer);
                        let event = TransportEvent::Received {
                            kind: TransportKind::Tcp,
                            source: peer,
                            destination: inner.local_addr,
                            payload: Bytes::copy_from_slice(&buffer[..len]),
                        };
                        if inner.ingress_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        warn!("TCP read from {} failed: {}", peer, e);
                        let _ = inner.ingress_tx.send(TransportEvent::Error {
                            kind: TransportKind::Tcp,
                            peer: Some(peer),
                            error: format!("read failed: {}", e),
                        });
                        break;
                    }
                }
            }
            inner.connections.lock().unwrap().remove(&peer);
        });
    }
}

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr)
    }

    fn try_send(&self, destination: SocketAddr, payload: &[u8]) -> Result<SendOutcome> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        let mut connections = self.inner.connections.lock().unwrap();
        let result = match connections.get_mut(&destination) {
            Some(conn) => conn.send(payload),
            None => return Err(Error::NoConnection(destination)),
        };
        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // The write side is broken; drop the connection so the
                // next send fails fast instead of queueing forever.
                connections.remove(&destination);
                Err(Error::SendFailed(destination, e))
            }
        }
    }

    fn flush_pending(&self) -> Result<()> {
        let mut connections = self.inner.connections.lock().unwrap();
        let mut broken = Vec::new();
        for (peer, conn) in connections.iter_mut() {
            if conn.pending.is_empty() {
                continue;
            }
            match conn.drain_pending() {
                Ok(true) => trace!("drained parked bytes to {}", peer),
                Ok(false) => {}
                Err(e) => {
                    warn!("flush to {} failed: {}", peer, e);
                    let _ = self.inner.ingress_tx.send(TransportEvent::Error {
                        kind: TransportKind::Tcp,
                        peer: Some(*peer),
                        error: format!("write failed: {}", e),
                    });
                    broken.push(*peer);
                }
            }
        }
        for peer in broken {
            connections.remove(&peer);
        }
        Ok(())
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Relaxed);
        // Dropping the write halves shuts down our side; read loops
        // exit on the resulting EOF or error.
        self.inner.connections.lock().unwrap().clear();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport({})", self.inner.local_addr)
    }
}
