//! The transaction type shared by all four RFC 3261 state machines.
//!
//! A [`Transaction`] is plain data owned by the engine's table. Machine
//! logic lives in the `client` and `server` modules as functions over
//! `&mut Transaction`; everything they need to touch outside the
//! transaction itself (timers, transports, the TU event channel) is
//! passed in as [`Effects`]. Nothing in here blocks or awaits.

mod key;
mod state;

pub use key::{TransactionKey, MAGIC_COOKIE};
pub use state::{validate_transition, TransactionKind, TransactionState};

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use ringline_sip_core::{Method, Request, Response};
use ringline_sip_transport::{SendOutcome, TransportKind, TransportSelector};

use crate::error::{Error, Result};
use crate::events::TransactionEvent;
use crate::timer::{TimerHandle, TimerKind, TimerQueue, TimerSettings};
use crate::{client, server};

/// What the engine should do with a transaction after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the transaction in the table
    Continue,
    /// Remove the transaction and announce its termination
    Destroy,
}

/// Borrowed engine context handed to the state machines.
///
/// `now` is the reactor's notion of the current instant for this
/// processing pass; every timer armed during the pass is measured from
/// it, which keeps retransmission schedules exact under test clocks.
pub(crate) struct Effects<'a> {
    pub timers: &'a mut TimerQueue,
    pub transports: &'a TransportSelector,
    pub events: &'a mpsc::UnboundedSender<TransactionEvent>,
    pub settings: &'a TimerSettings,
    pub now: Instant,
}

impl Effects<'_> {
    /// Reports an event to the TU. A dropped receiver is not an error
    /// the transaction layer can act on.
    pub fn emit(&self, event: TransactionEvent) {
        let _ = self.events.send(event);
    }

    pub fn schedule(&mut self, key: &TransactionKey, kind: TimerKind, delay: Duration) -> TimerHandle {
        self.timers.schedule(key.clone(), kind, delay, self.now)
    }

    /// Hands bytes to the transport. Failures are reported to the TU
    /// and otherwise swallowed: the retransmission timers are the
    /// recovery mechanism, so one lost send never kills a transaction.
    pub fn send(
        &self,
        transport: TransportKind,
        destination: SocketAddr,
        payload: &[u8],
        key: &TransactionKey,
    ) {
        match self.transports.try_send(transport, destination, payload) {
            Ok(SendOutcome::Sent) => {
                trace!("sent {} bytes to {} over {}", payload.len(), destination, transport);
            }
            Ok(SendOutcome::WouldBlock) => {
                debug!("transport {} busy, {} bytes to {} deferred", transport, payload.len(), destination);
            }
            Err(e) => {
                warn!("send to {} over {} failed for {}: {}", destination, transport, key, e);
                self.emit(TransactionEvent::TransportError {
                    key: Some(key.clone()),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// One SIP transaction: its identity, protocol state, cached wire
/// images and timer handles. Owned exclusively by the engine's table.
pub struct Transaction {
    pub(crate) key: TransactionKey,
    pub(crate) kind: TransactionKind,
    pub(crate) state: TransactionState,
    /// Peer address: destination for client transactions, source for
    /// server transactions.
    pub(crate) remote: SocketAddr,
    pub(crate) transport: TransportKind,
    /// The request that created the transaction.
    pub(crate) request: Request,
    /// Encoded request, kept by client transactions so retransmissions
    /// are byte-identical.
    pub(crate) request_wire: Option<Bytes>,
    /// Last response sent, kept by server transactions so replays to
    /// retransmitted requests are byte-identical.
    pub(crate) last_response: Option<Bytes>,
    /// ACK generated for a non-2xx final, kept by INVITE client
    /// transactions for replay.
    pub(crate) ack_wire: Option<Bytes>,
    /// Current retransmission interval (doubles per fire).
    pub(crate) retransmit_interval: Duration,
    pub(crate) retransmit_timer: Option<TimerHandle>,
    pub(crate) guard_timer: Option<TimerHandle>,
}

impl Transaction {
    /// Builds a client transaction around a request this side sends.
    pub fn new_client(
        key: TransactionKey,
        request: Request,
        destination: SocketAddr,
        transport: TransportKind,
    ) -> Self {
        let kind = if request.method == Method::Invite {
            TransactionKind::InviteClient
        } else {
            TransactionKind::NonInviteClient
        };
        let wire = request.encode();
        Transaction {
            key,
            kind,
            state: TransactionState::Initial,
            remote: destination,
            transport,
            request,
            request_wire: Some(wire),
            last_response: None,
            ack_wire: None,
            retransmit_interval: Duration::ZERO,
            retransmit_timer: None,
            guard_timer: None,
        }
    }

    /// Builds a server transaction around a request just received.
    pub fn new_server(
        key: TransactionKey,
        request: Request,
        source: SocketAddr,
        transport: TransportKind,
    ) -> Self {
        let kind = if request.method == Method::Invite {
            TransactionKind::InviteServer
        } else {
            TransactionKind::NonInviteServer
        };
        Transaction {
            key,
            kind,
            state: TransactionState::Initial,
            remote: source,
            transport,
            request,
            request_wire: None,
            last_response: None,
            ack_wire: None,
            retransmit_interval: Duration::ZERO,
            retransmit_timer: None,
            guard_timer: None,
        }
    }

    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Kicks the machine off: client sends and arms timers, server
    /// moves to its waiting state.
    pub(crate) fn start(&mut self, fx: &mut Effects<'_>) {
        match self.kind {
            TransactionKind::InviteClient => client::invite::start(self, fx),
            TransactionKind::NonInviteClient => client::non_invite::start(self, fx),
            TransactionKind::InviteServer => server::invite::start(self, fx),
            TransactionKind::NonInviteServer => server::non_invite::start(self, fx),
        }
    }

    /// A response matched this (client) transaction.
    pub(crate) fn on_response(&mut self, fx: &mut Effects<'_>, response: &Response) -> Disposition {
        match self.kind {
            TransactionKind::InviteClient => client::invite::on_response(self, fx, response),
            TransactionKind::NonInviteClient => client::non_invite::on_response(self, fx, response),
            _ => {
                warn!("response dispatched to server transaction {}", self.key);
                Disposition::Continue
            }
        }
    }

    /// A request matched this (server) transaction: a retransmission,
    /// or for INVITE possibly the ACK.
    pub(crate) fn on_request(&mut self, fx: &mut Effects<'_>, request: &Request) -> Disposition {
        match self.kind {
            TransactionKind::InviteServer => server::invite::on_request(self, fx, request),
            TransactionKind::NonInviteServer => server::non_invite::on_request(self, fx, request),
            _ => {
                warn!("request dispatched to client transaction {}", self.key);
                Disposition::Continue
            }
        }
    }

    /// The TU wants this (server) transaction to send a response.
    pub(crate) fn send_response(
        &mut self,
        fx: &mut Effects<'_>,
        response: &Response,
    ) -> Result<Disposition> {
        match self.kind {
            TransactionKind::InviteServer => server::invite::send_response(self, fx, response),
            TransactionKind::NonInviteServer => server::non_invite::send_response(self, fx, response),
            _ => Err(Error::InvalidStateTransition(format!(
                "client transaction {} cannot send a response",
                self.key
            ))),
        }
    }

    /// A timer armed by this transaction fired.
    pub(crate) fn on_timer(&mut self, fx: &mut Effects<'_>, kind: TimerKind) -> Disposition {
        match self.kind {
            TransactionKind::InviteClient => client::invite::on_timer(self, fx, kind),
            TransactionKind::NonInviteClient => client::non_invite::on_timer(self, fx, kind),
            TransactionKind::InviteServer => server::invite::on_timer(self, fx, kind),
            TransactionKind::NonInviteServer => server::non_invite::on_timer(self, fx, kind),
        }
    }

    // ---- helpers shared by the machines ----

    /// Moves to `to` if the machine allows it. Invalid moves are logged
    /// and refused rather than panicking; the caller's state re-check
    /// then does the right thing.
    pub(crate) fn transition(&mut self, to: TransactionState) -> bool {
        if !validate_transition(self.kind, self.state, to) {
            warn!(
                "rejected invalid {} transition {} -> {} for {}",
                self.kind, self.state, to, self.key
            );
            return false;
        }
        if self.state != to {
            debug!("{} {}: {} -> {}", self.kind, self.key, self.state, to);
            self.state = to;
        }
        true
    }

    pub(crate) fn reliable(&self) -> bool {
        self.transport.is_reliable()
    }

    /// Duration for a wait timer, collapsed to zero on reliable
    /// transports so the timer fires on the next drain.
    pub(crate) fn wait_delay(&self, delay: Duration) -> Duration {
        if self.reliable() {
            Duration::ZERO
        } else {
            delay
        }
    }

    pub(crate) fn send_request_wire(&self, fx: &mut Effects<'_>) {
        if let Some(wire) = &self.request_wire {
            fx.send(self.transport, self.remote, wire, &self.key);
        }
    }

    pub(crate) fn send_cached_response(&self, fx: &mut Effects<'_>) {
        if let Some(wire) = &self.last_response {
            fx.send(self.transport, self.remote, wire, &self.key);
        }
    }

    /// Arms the retransmission timer at T1 for the first time.
    pub(crate) fn arm_retransmit(&mut self, fx: &mut Effects<'_>, kind: TimerKind) {
        self.retransmit_interval = fx.settings.t1;
        let handle = fx.schedule(&self.key, kind, self.retransmit_interval);
        self.retransmit_timer = Some(handle);
    }

    /// Re-arms after a retransmission: schedule at the current interval,
    /// then double it, capping at `cap` when one is given. This yields
    /// fire offsets of T1, 2*T1, 4*T1 and so on from transaction start.
    pub(crate) fn rearm_retransmit(
        &mut self,
        fx: &mut Effects<'_>,
        kind: TimerKind,
        cap: Option<Duration>,
    ) {
        let delay = self.retransmit_interval;
        let handle = fx.schedule(&self.key, kind, delay);
        self.retransmit_timer = Some(handle);
        let next = delay.saturating_mul(2);
        self.retransmit_interval = match cap {
            Some(cap) => next.min(cap),
            None => next,
        };
    }

    pub(crate) fn arm_guard(&mut self, fx: &mut Effects<'_>, kind: TimerKind, delay: Duration) {
        if let Some(handle) = self.guard_timer.take() {
            fx.timers.cancel(handle);
        }
        self.guard_timer = Some(fx.schedule(&self.key, kind, delay));
    }

    pub(crate) fn cancel_retransmit(&mut self, fx: &mut Effects<'_>) {
        if let Some(handle) = self.retransmit_timer.take() {
            fx.timers.cancel(handle);
        }
    }

    pub(crate) fn cancel_guard(&mut self, fx: &mut Effects<'_>) {
        if let Some(handle) = self.guard_timer.take() {
            fx.timers.cancel(handle);
        }
    }

    pub(crate) fn cancel_timers(&mut self, fx: &mut Effects<'_>) {
        self.cancel_retransmit(fx);
        self.cancel_guard(fx);
    }
}
