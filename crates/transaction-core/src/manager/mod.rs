//! The transaction engine: a single-task reactor that owns every live
//! transaction.
//!
//! All protocol state lives behind one `&mut Engine`. Transports push
//! raw bytes onto the ingress channel from their own tasks and TU
//! handles push commands; the reactor drains both, fires due timers and
//! dispatches everything in one deterministic pass ([`Engine::process_once`]).
//! Messages queue ahead of timers inside a pass, so a response that
//! arrives together with a retransmission deadline always wins. Nothing
//! in the dispatch path blocks or awaits.

mod table;

pub use table::TransactionTable;

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::sleep_until;
use tracing::{debug, info, trace, warn};

use ringline_sip_core::{parse_message, Message, Method, Request, Response, Scanner};
use ringline_sip_transport::{
    SendOutcome, TransportEvent, TransportKind, TransportSelector,
};

use crate::error::{Error, Result};
use crate::events::{EngineCommand, TransactionEvent};
use crate::timer::{TimerKind, TimerQueue, TimerSettings};
use crate::transaction::{Disposition, Effects, Transaction, TransactionKey, TransactionKind};
use crate::utils;

/// Wake interval when no timers are armed, so parked stream writes are
/// still retried on a quiet engine.
const IDLE_TICK: Duration = Duration::from_secs(1);

/// Effects context over disjoint field borrows, so a transaction pulled
/// out of the table can be mutated alongside it.
macro_rules! effects {
    ($engine:ident, $now:expr) => {
        Effects {
            timers: &mut $engine.timers,
            transports: &$engine.selector,
            events: &$engine.events_tx,
            settings: &$engine.settings,
            now: $now,
        }
    };
}

/// Engine behavior knobs beyond the timer durations.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Answer a new INVITE server transaction with `100 Trying` before
    /// the TU has seen it. Stops INVITE retransmissions early; RFC 3261
    /// 17.2.1 leaves this to the transaction layer's discretion.
    pub auto_trying: bool,
    /// Upper bound on live transactions. Requests over the bound create
    /// no state and pass through as unmatched, so the TU can still
    /// answer statelessly.
    pub max_transactions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            auto_trying: true,
            max_transactions: 65_536,
        }
    }
}

/// One unit of work for a processing pass.
enum WorkItem {
    /// A framed message off a transport
    Message {
        message: Message,
        source: SocketAddr,
        transport: TransportKind,
    },
    /// A due timer
    Timer {
        key: TransactionKey,
        kind: TimerKind,
    },
    /// A command from a TU handle
    Command(EngineCommand),
}

/// The reactor. Owns the transaction table, the timer queue, the
/// registered transports and the per-peer stream scanners.
pub struct Engine {
    config: EngineConfig,
    settings: TimerSettings,
    /// All live transactions
    table: TransactionTable,
    /// All armed timers
    timers: TimerQueue,
    /// Work queued for the current pass
    work: VecDeque<WorkItem>,
    /// Registered transports for outbound sends
    selector: TransportSelector,
    /// Stream reassembly state, one scanner per connected peer
    scanners: HashMap<SocketAddr, Scanner>,
    /// Raw bytes and connection events from the transports
    ingress_rx: mpsc::UnboundedReceiver<TransportEvent>,
    /// Commands from cloned handles
    commands_rx: mpsc::UnboundedReceiver<EngineCommand>,
    /// Events to the TU
    events_tx: mpsc::UnboundedSender<TransactionEvent>,
    running: bool,
}

impl Engine {
    /// Creates an engine together with its TU handle and event stream.
    pub fn new(
        config: EngineConfig,
        settings: TimerSettings,
        selector: TransportSelector,
        ingress_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (
        Self,
        EngineHandle,
        mpsc::UnboundedReceiver<TransactionEvent>,
    ) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Engine {
            config,
            settings,
            table: TransactionTable::new(),
            timers: TimerQueue::new(),
            work: VecDeque::new(),
            selector,
            scanners: HashMap::new(),
            ingress_rx,
            commands_rx,
            events_tx,
            running: true,
        };
        (engine, EngineHandle { commands_tx }, events_rx)
    }

    /// Number of transactions currently in the table.
    pub fn transaction_count(&self) -> usize {
        self.table.len()
    }

    /// Earliest armed timer deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs one processing pass at `now`. Returns whether any work was
    /// dispatched.
    ///
    /// The pass has a fixed shape: pull everything the channels already
    /// hold into the work queue, then append every timer due by `now`,
    /// then dispatch in order. Queued messages therefore always run
    /// before timers that became due at the same moment, which is what
    /// lets a final response suppress the retransmission it raced.
    pub fn process_once(&mut self, now: Instant) -> bool {
        while let Ok(event) = self.ingress_rx.try_recv() {
            self.ingest(event);
        }
        while let Ok(command) = self.commands_rx.try_recv() {
            self.work.push_back(WorkItem::Command(command));
        }
        self.selector.flush_pending();

        for (key, kind) in self.timers.drain_due(now) {
            self.work.push_back(WorkItem::Timer { key, kind });
        }

        let mut dispatched = false;
        while let Some(item) = self.work.pop_front() {
            dispatched = true;
            match item {
                WorkItem::Message {
                    message,
                    source,
                    transport,
                } => self.dispatch_message(message, source, transport, now),
                WorkItem::Timer { key, kind } => self.dispatch_timer(key, kind, now),
                WorkItem::Command(command) => self.dispatch_command(command, now),
            }
        }
        dispatched
    }

    /// Drives the engine until shutdown or until every channel closes.
    pub async fn run(&mut self) {
        info!("transaction engine running");
        while self.running {
            let now = tokio::time::Instant::now().into_std();
            self.process_once(now);
            if !self.running {
                break;
            }

            // Wake for the earliest timer, or tick so flush_pending
            // still runs while idle.
            let deadline = self.timers.next_deadline().unwrap_or(now + IDLE_TICK);

            tokio::select! {
                _ = sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                event = self.ingress_rx.recv() => match event {
                    Some(event) => self.ingest(event),
                    None => {
                        info!("ingress channel closed, stopping engine");
                        self.running = false;
                    }
                },
                command = self.commands_rx.recv() => match command {
                    Some(command) => self.work.push_back(WorkItem::Command(command)),
                    None => {
                        info!("command channel closed, stopping engine");
                        self.running = false;
                    }
                },
            }
        }
        debug!("engine loop exited");
    }

    /// Turns a transport event into queued work. Datagrams parse whole;
    /// stream bytes go through the per-peer scanner.
    fn ingest(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Received {
                kind,
                source,
                payload,
                ..
            } => match kind {
                TransportKind::Udp => match parse_message(&payload) {
                    Ok(message) => self.work.push_back(WorkItem::Message {
                        message,
                        source,
                        transport: kind,
                    }),
                    Err(e) => {
                        debug!("discarding unparseable datagram from {}: {}", source, e);
                    }
                },
                TransportKind::Tcp => self.ingest_stream(kind, source, &payload),
            },
            TransportEvent::PeerClosed { kind, peer } => {
                trace!("{} peer {} closed", kind, peer);
                self.scanners.remove(&peer);
            }
            TransportEvent::Error { kind, peer, error } => {
                warn!("{} transport error (peer {:?}): {}", kind, peer, error);
                self.emit(TransactionEvent::TransportError { key: None, error });
            }
        }
    }

    fn ingest_stream(&mut self, kind: TransportKind, source: SocketAddr, payload: &[u8]) {
        let scanner = self
            .scanners
            .entry(source)
            .or_insert_with(Scanner::new_stream);
        scanner.push(payload);
        loop {
            match scanner.poll_message() {
                Ok(Some(message)) => self.work.push_back(WorkItem::Message {
                    message,
                    source,
                    transport: kind,
                }),
                Ok(None) => break,
                Err(e) => {
                    // Drop the unusable prefix and rescan; the stream
                    // may resynchronize at the next message boundary.
                    let dropped = scanner.discard_failed();
                    warn!("dropped {} unusable bytes from {}: {}", dropped, source, e);
                    if dropped == 0 {
                        break;
                    }
                }
            }
        }
    }

    fn dispatch_message(
        &mut self,
        message: Message,
        source: SocketAddr,
        transport: TransportKind,
        now: Instant,
    ) {
        match message {
            Message::Request(request) => self.dispatch_request(request, source, transport, now),
            Message::Response(response) => self.dispatch_response(response, source, now),
        }
    }

    fn dispatch_request(
        &mut self,
        request: Request,
        source: SocketAddr,
        transport: TransportKind,
        now: Instant,
    ) {
        let key = match TransactionKey::from_request(&request) {
            Ok(key) => key,
            Err(e) => {
                debug!("request from {} without usable transaction key: {}", source, e);
                self.emit(TransactionEvent::UnmatchedMessage {
                    message: Message::Request(request),
                    source,
                });
                return;
            }
        };

        // A retransmission, or for INVITE possibly the ACK, of a live
        // transaction.
        if self.table.contains(&key) {
            self.request_for_existing(&key, &request, now);
            return;
        }

        match request.method {
            Method::Ack => {
                // ACK for a 2xx: its INVITE transaction is gone (or
                // never was here). The ACK belongs to the TU.
                trace!("ACK from {} matches no transaction", source);
                self.emit(TransactionEvent::UnmatchedMessage {
                    message: Message::Request(request),
                    source,
                });
            }
            Method::Cancel => self.accept_cancel(key, request, source, transport, now),
            _ => self.accept_request(key, request, source, transport, now),
        }
    }

    fn request_for_existing(&mut self, key: &TransactionKey, request: &Request, now: Instant) {
        let disposition = match self.table.get_mut(key) {
            Some(tx) => {
                let mut fx = effects!(self, now);
                tx.on_request(&mut fx, request)
            }
            None => return,
        };
        if disposition == Disposition::Destroy {
            self.destroy(key);
        }
    }

    /// Creates a server transaction for a request that matched nothing.
    fn accept_request(
        &mut self,
        key: TransactionKey,
        request: Request,
        source: SocketAddr,
        transport: TransportKind,
        now: Instant,
    ) {
        if self.table.len() >= self.config.max_transactions {
            warn!(
                "transaction table at capacity ({}), passing {} from {} through unmatched",
                self.table.len(),
                request.method,
                source
            );
            self.emit(TransactionEvent::UnmatchedMessage {
                message: Message::Request(request),
                source,
            });
            return;
        }

        let mut tx = Transaction::new_server(key.clone(), request.clone(), source, transport);
        let mut fx = effects!(self, now);
        tx.start(&mut fx);

        if self.config.auto_trying && tx.kind() == TransactionKind::InviteServer {
            let trying = utils::create_trying_response(tx.request());
            if let Err(e) = tx.send_response(&mut fx, &trying) {
                warn!("automatic 100 Trying for {} failed: {}", key, e);
            }
        }

        if let Err(e) = self.table.insert(tx) {
            warn!("could not store server transaction: {}", e);
            return;
        }
        debug!("created server transaction {} from {}", key, source);
        self.emit(TransactionEvent::NewRequest {
            key,
            request,
            source,
            transport,
        });
    }

    /// CANCEL runs as its own server transaction. When an INVITE server
    /// transaction with the same identity is live, the TU additionally
    /// learns which transaction the CANCEL aims at.
    fn accept_cancel(
        &mut self,
        key: TransactionKey,
        request: Request,
        source: SocketAddr,
        transport: TransportKind,
        now: Instant,
    ) {
        let invite_key = key.with_method(Method::Invite);
        let cancels_live_invite = self.table.contains(&invite_key);

        let cancel = request.clone();
        self.accept_request(key, request, source, transport, now);

        if cancels_live_invite {
            self.emit(TransactionEvent::CancelReceived {
                key: invite_key,
                cancel,
            });
        } else {
            debug!("CANCEL from {} matches no INVITE transaction", source);
        }
    }

    fn dispatch_response(&mut self, response: Response, source: SocketAddr, now: Instant) {
        let key = match TransactionKey::from_response(&response) {
            Ok(key) => key,
            Err(e) => {
                debug!("response from {} without usable transaction key: {}", source, e);
                self.emit(TransactionEvent::UnmatchedMessage {
                    message: Message::Response(response),
                    source,
                });
                return;
            }
        };

        let disposition = match self.table.get_mut(&key) {
            Some(tx) => {
                let mut fx = effects!(self, now);
                tx.on_response(&mut fx, &response)
            }
            None => {
                trace!("response {} from {} matches no transaction", response.status, source);
                self.emit(TransactionEvent::UnmatchedMessage {
                    message: Message::Response(response),
                    source,
                });
                return;
            }
        };
        if disposition == Disposition::Destroy {
            self.destroy(&key);
        }
    }

    fn dispatch_timer(&mut self, key: TransactionKey, kind: TimerKind, now: Instant) {
        let disposition = match self.table.get_mut(&key) {
            Some(tx) => {
                let mut fx = effects!(self, now);
                tx.on_timer(&mut fx, kind)
            }
            None => {
                // Drained in the same pass as the timer that destroyed
                // the transaction.
                trace!("{} fired for gone transaction {}", kind, key);
                return;
            }
        };
        if disposition == Disposition::Destroy {
            self.destroy(&key);
        }
    }

    fn dispatch_command(&mut self, command: EngineCommand, now: Instant) {
        match command {
            EngineCommand::SendRequest {
                key,
                request,
                destination,
                transport,
            } => self.command_send_request(key, request, destination, transport, now),
            EngineCommand::SendResponse { key, response } => {
                self.command_send_response(key, response, now)
            }
            EngineCommand::SendStateless {
                message,
                destination,
                transport,
            } => self.command_send_stateless(message, destination, transport),
            EngineCommand::Shutdown => self.shutdown(),
        }
    }

    fn command_send_request(
        &mut self,
        key: TransactionKey,
        request: Request,
        destination: SocketAddr,
        transport: TransportKind,
        now: Instant,
    ) {
        if self.table.contains(&key) {
            // The TU reused a branch. Dropping the request keeps the
            // live transaction intact.
            warn!("client transaction {} already exists, dropping request", key);
            return;
        }
        if self.table.len() >= self.config.max_transactions {
            warn!("transaction table at capacity, dropping outbound {}", key);
            self.emit(TransactionEvent::TransportError {
                key: Some(key),
                error: "transaction table at capacity".to_string(),
            });
            return;
        }

        let mut tx = Transaction::new_client(key.clone(), request, destination, transport);
        let mut fx = effects!(self, now);
        tx.start(&mut fx);

        if let Err(e) = self.table.insert(tx) {
            warn!("could not store client transaction: {}", e);
            return;
        }
        debug!("created client transaction {} toward {}", key, destination);
    }

    fn command_send_response(&mut self, key: TransactionKey, response: Response, now: Instant) {
        let disposition = match self.table.get_mut(&key) {
            Some(tx) => {
                let mut fx = effects!(self, now);
                tx.send_response(&mut fx, &response)
            }
            None => {
                warn!("response for unknown transaction {}", key);
                return;
            }
        };
        match disposition {
            Ok(Disposition::Continue) => {}
            Ok(Disposition::Destroy) => self.destroy(&key),
            Err(e) => warn!("response on {} rejected: {}", key, e),
        }
    }

    /// Sends a message with no transaction attached, for the ACK to a
    /// 2xx INVITE response.
    fn command_send_stateless(
        &mut self,
        message: Message,
        destination: SocketAddr,
        transport: TransportKind,
    ) {
        let payload = message.encode();
        match self.selector.try_send(transport, destination, &payload) {
            Ok(SendOutcome::Sent) => {
                trace!("stateless send of {} bytes to {}", payload.len(), destination);
            }
            Ok(SendOutcome::WouldBlock) => {
                debug!("stateless send to {} deferred", destination);
            }
            Err(e) => {
                warn!("stateless send to {} failed: {}", destination, e);
                self.emit(TransactionEvent::TransportError {
                    key: None,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Stops the loop, drops every live transaction and closes the
    /// registered transports. Events already emitted stay readable.
    fn shutdown(&mut self) {
        info!("engine shutting down with {} live transactions", self.table.len());
        self.running = false;
        for key in self.table.drain() {
            self.emit(TransactionEvent::TransactionTerminated { key });
        }
        self.selector.close_all();
    }

    /// Removes a transaction and tells the TU it is gone.
    fn destroy(&mut self, key: &TransactionKey) {
        if self.table.remove(key).is_some() {
            trace!("transaction {} destroyed", key);
            self.emit(TransactionEvent::TransactionTerminated { key: key.clone() });
        }
    }

    fn emit(&self, event: TransactionEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// Cloneable front door to the engine.
///
/// Commands are queued on an unbounded channel and handled on the next
/// reactor pass; outcomes of the actual sends come back as
/// [`TransactionEvent`]s.
#[derive(Clone)]
pub struct EngineHandle {
    commands_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    /// Starts a client transaction for `request` and returns its key.
    ///
    /// ACK is refused here: the ACK for a non-2xx final is generated by
    /// the INVITE client transaction itself, and the ACK for a 2xx is
    /// not a transaction at all and goes through [`send_stateless`].
    ///
    /// [`send_stateless`]: EngineHandle::send_stateless
    pub fn send_request(
        &self,
        request: Request,
        destination: SocketAddr,
        transport: TransportKind,
    ) -> Result<TransactionKey> {
        if request.method == Method::Ack {
            return Err(Error::Other(
                "ACK does not open a client transaction, use send_stateless".to_string(),
            ));
        }
        let key = TransactionKey::for_client_request(&request)?;
        self.commands_tx.send(EngineCommand::SendRequest {
            key: key.clone(),
            request,
            destination,
            transport,
        })?;
        Ok(key)
    }

    /// Hands a response to the keyed server transaction.
    pub fn send_response(&self, key: TransactionKey, response: Response) -> Result<()> {
        self.commands_tx
            .send(EngineCommand::SendResponse { key, response })?;
        Ok(())
    }

    /// Sends a message without creating transaction state.
    pub fn send_stateless(
        &self,
        message: Message,
        destination: SocketAddr,
        transport: TransportKind,
    ) -> Result<()> {
        self.commands_tx.send(EngineCommand::SendStateless {
            message,
            destination,
            transport,
        })?;
        Ok(())
    }

    /// Asks the engine to stop.
    pub fn shutdown(&self) -> Result<()> {
        self.commands_tx.send(EngineCommand::Shutdown)?;
        Ok(())
    }
}
