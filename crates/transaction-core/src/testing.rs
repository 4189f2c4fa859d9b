//! Shared fixtures for in-crate unit tests: a recording transport, an
//! effects harness with a synthetic clock, and canned messages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use ringline_sip_core::{
    HeaderName, Method, Request, RequestBuilder, Response, StatusCode, TypedHeader,
};
use ringline_sip_transport::{SendOutcome, Transport, TransportKind, TransportSelector};

use crate::events::TransactionEvent;
use crate::timer::{TimerKind, TimerQueue, TimerSettings};
use crate::transaction::{Disposition, Effects, Transaction};
use crate::utils;

/// Transport stub that records payloads instead of hitting sockets.
#[derive(Debug)]
pub(crate) struct MockTransport {
    kind: TransportKind,
    local: SocketAddr,
    pub sent: Mutex<Vec<(SocketAddr, Bytes)>>,
    pub fail_sends: AtomicBool,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        MockTransport {
            kind,
            local: "127.0.0.1:5060".parse().unwrap(),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_payloads(&self) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn last_sent(&self) -> Option<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .map(|(_, payload)| payload.clone())
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> ringline_sip_transport::Result<SocketAddr> {
        Ok(self.local)
    }

    fn try_send(
        &self,
        destination: SocketAddr,
        payload: &[u8],
    ) -> ringline_sip_transport::Result<SendOutcome> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ringline_sip_transport::Error::SendFailed(
                destination,
                std::io::Error::new(std::io::ErrorKind::Other, "mock failure"),
            ));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination, Bytes::copy_from_slice(payload)));
        Ok(SendOutcome::Sent)
    }

    fn flush_pending(&self) -> ringline_sip_transport::Result<()> {
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Everything a machine needs around it, with a clock the test drives.
pub(crate) struct Harness {
    pub timers: TimerQueue,
    pub selector: TransportSelector,
    pub transport: Arc<MockTransport>,
    pub events_tx: mpsc::UnboundedSender<TransactionEvent>,
    pub events_rx: mpsc::UnboundedReceiver<TransactionEvent>,
    pub settings: TimerSettings,
    pub epoch: Instant,
}

impl Harness {
    pub fn new(kind: TransportKind) -> Self {
        let transport = Arc::new(MockTransport::new(kind));
        let mut selector = TransportSelector::new();
        selector.register(transport.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Harness {
            timers: TimerQueue::new(),
            selector,
            transport,
            events_tx,
            events_rx,
            settings: TimerSettings::default(),
            epoch: Instant::now(),
        }
    }

    /// Effects snapshot at the given instant.
    pub fn fx(&mut self, now: Instant) -> Effects<'_> {
        Effects {
            timers: &mut self.timers,
            transports: &self.selector,
            events: &self.events_tx,
            settings: &self.settings,
            now,
        }
    }

    /// `epoch + offset_ms`.
    pub fn at(&self, offset_ms: u64) -> Instant {
        self.epoch + Duration::from_millis(offset_ms)
    }

    pub fn drain_events(&mut self) -> Vec<TransactionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Fires every timer due up to `epoch + until_ms`, feeding each to the
/// transaction in queue order. Returns the fire offset in milliseconds,
/// the timer kind and the resulting disposition for each.
pub(crate) fn pump_timers(
    h: &mut Harness,
    tx: &mut Transaction,
    until_ms: u64,
) -> Vec<(u64, TimerKind, Disposition)> {
    let mut fired = Vec::new();
    loop {
        let deadline = match h.timers.next_deadline() {
            Some(deadline) if deadline <= h.at(until_ms) => deadline,
            _ => break,
        };
        let due = h.timers.drain_due(deadline);
        for (_key, kind) in due {
            let offset = deadline.duration_since(h.epoch).as_millis() as u64;
            let mut fx = h.fx(deadline);
            let disposition = tx.on_timer(&mut fx, kind);
            fired.push((offset, kind, disposition));
        }
    }
    fired
}

pub(crate) fn invite_request(branch: &str) -> Request {
    RequestBuilder::invite("sip:bob@biloxi.example.com")
        .unwrap()
        .via("UDP", "10.1.1.1:5060", Some(branch))
        .max_forwards(70)
        .from("Alice", "sip:alice@atlanta.example.com", Some("a73kszlfl"))
        .unwrap()
        .to("Bob", "sip:bob@biloxi.example.com", None)
        .unwrap()
        .call_id("f81d4fae7dec@atlanta.example.com")
        .cseq(314159)
        .contact("sip:alice@10.1.1.1")
        .unwrap()
        .build()
}

/// ACK matching [`invite_request`] with the same branch, as sent for a
/// non-2xx final.
pub(crate) fn ack_request(branch: &str) -> Request {
    RequestBuilder::new(Method::Ack, "sip:bob@biloxi.example.com")
        .unwrap()
        .via("UDP", "10.1.1.1:5060", Some(branch))
        .max_forwards(70)
        .from("Alice", "sip:alice@atlanta.example.com", Some("a73kszlfl"))
        .unwrap()
        .to("Bob", "sip:bob@biloxi.example.com", Some("tag-486"))
        .unwrap()
        .call_id("f81d4fae7dec@atlanta.example.com")
        .cseq(314159)
        .build()
}

pub(crate) fn options_request(branch: &str) -> Request {
    RequestBuilder::options("sip:bob@biloxi.example.com")
        .unwrap()
        .via("UDP", "10.1.1.1:5060", Some(branch))
        .max_forwards(70)
        .from("Alice", "sip:alice@atlanta.example.com", Some("a73kszlfl"))
        .unwrap()
        .to("Bob", "sip:bob@biloxi.example.com", None)
        .unwrap()
        .call_id("63104@atlanta.example.com")
        .cseq(63104)
        .build()
}

/// Response to `request` with the identity headers copied, optionally
/// tagging To the way a remote UA would.
pub(crate) fn response_to(request: &Request, status: StatusCode, to_tag: Option<&str>) -> Response {
    let mut response = utils::create_response(request, status);
    if let Some(tag) = to_tag {
        if let Some(slot) = response.headers.get_mut(&HeaderName::To) {
            if let Ok(TypedHeader::To(address)) = slot.typed_mut() {
                address.set_tag(tag);
            }
        }
    }
    response
}

pub(crate) fn peer_addr() -> SocketAddr {
    "192.0.2.10:5060".parse().unwrap()
}
