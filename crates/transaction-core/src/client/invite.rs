//! INVITE client transaction, RFC 3261 section 17.1.1.
//!
//! Calling: the INVITE is out, Timer A retransmits it, Timer B bounds
//! the wait. A provisional moves to Proceeding and stops Timer A. A
//! 2xx terminates immediately; the TU owns that ACK, so the machine
//! only lingers to route retransmitted 2xx upward. A 3xx-6xx is ACKed
//! here, reported, and absorbed through Timer D.

use tracing::{debug, warn};

use ringline_sip_core::Response;

use crate::events::TransactionEvent;
use crate::timer::TimerKind;
use crate::transaction::{Disposition, Effects, Transaction, TransactionState};
use crate::utils;

pub(crate) fn start(tx: &mut Transaction, fx: &mut Effects<'_>) {
    tx.send_request_wire(fx);
    if !tx.transition(TransactionState::Calling) {
        return;
    }
    if !tx.reliable() {
        tx.arm_retransmit(fx, TimerKind::A);
    }
    let timeout = fx.settings.transaction_timeout;
    tx.arm_guard(fx, TimerKind::B, timeout);
}

pub(crate) fn on_response(
    tx: &mut Transaction,
    fx: &mut Effects<'_>,
    response: &Response,
) -> Disposition {
    let status = response.status;
    match tx.state {
        TransactionState::Calling | TransactionState::Proceeding if status.is_provisional() => {
            // Any answer from the server stops request retransmission.
            tx.cancel_retransmit(fx);
            tx.transition(TransactionState::Proceeding);
            fx.emit(TransactionEvent::ProvisionalResponse {
                key: tx.key.clone(),
                response: response.clone(),
            });
            Disposition::Continue
        }
        TransactionState::Calling | TransactionState::Proceeding if status.is_success() => {
            // The TU owns the ACK for a 2xx. The machine is done, but
            // it lingers so a retransmitted 2xx still finds it.
            tx.cancel_timers(fx);
            fx.emit(TransactionEvent::SuccessResponse {
                key: tx.key.clone(),
                response: response.clone(),
            });
            tx.transition(TransactionState::Terminated);
            let linger = tx.wait_delay(fx.settings.stale_linger);
            tx.arm_guard(fx, TimerKind::Stale, linger);
            Disposition::Continue
        }
        TransactionState::Calling | TransactionState::Proceeding => {
            // 3xx-6xx: this layer ACKs, reports, then waits out D.
            tx.cancel_retransmit(fx);
            send_ack(tx, fx, response);
            fx.emit(TransactionEvent::FailureResponse {
                key: tx.key.clone(),
                response: response.clone(),
            });
            tx.transition(TransactionState::Completed);
            let delay = tx.wait_delay(fx.settings.wait_time_d);
            tx.arm_guard(fx, TimerKind::D, delay);
            Disposition::Continue
        }
        TransactionState::Completed => {
            if status.is_final() && !status.is_success() {
                // Retransmitted final: replay the ACK byte-for-byte,
                // nothing goes up a second time.
                debug!("{} replaying ACK for retransmitted {}", tx.key, status.as_u16());
                if let Some(wire) = &tx.ack_wire {
                    fx.send(tx.transport, tx.remote, wire, &tx.key);
                }
            } else {
                debug!("{} absorbed {} in Completed", tx.key, status.as_u16());
            }
            Disposition::Continue
        }
        TransactionState::Terminated => {
            if status.is_success() {
                // Lingering after a 2xx: the TU re-sends its ACK.
                fx.emit(TransactionEvent::SuccessResponse {
                    key: tx.key.clone(),
                    response: response.clone(),
                });
            } else {
                debug!("{} absorbed {} while lingering", tx.key, status.as_u16());
            }
            Disposition::Continue
        }
        state => {
            warn!("{} ignoring response in state {}", tx.key, state);
            Disposition::Continue
        }
    }
}

pub(crate) fn on_timer(tx: &mut Transaction, fx: &mut Effects<'_>, kind: TimerKind) -> Disposition {
    match kind {
        TimerKind::A => {
            if tx.state == TransactionState::Calling {
                debug!("{} retransmitting INVITE", tx.key);
                tx.send_request_wire(fx);
                tx.rearm_retransmit(fx, TimerKind::A, None);
            }
            Disposition::Continue
        }
        TimerKind::B => {
            if tx.state == TransactionState::Calling {
                warn!("{} timed out with no response", tx.key);
                fx.emit(TransactionEvent::TransactionTimeout {
                    key: tx.key.clone(),
                });
                tx.transition(TransactionState::Terminated);
                Disposition::Destroy
            } else {
                Disposition::Continue
            }
        }
        TimerKind::D => {
            if tx.state == TransactionState::Completed {
                tx.transition(TransactionState::Terminated);
                Disposition::Destroy
            } else {
                Disposition::Continue
            }
        }
        TimerKind::Stale => {
            if tx.state == TransactionState::Terminated {
                Disposition::Destroy
            } else {
                Disposition::Continue
            }
        }
        other => {
            debug!("{} ignoring unexpected {}", tx.key, other);
            Disposition::Continue
        }
    }
}

/// Builds and sends the ACK for a non-2xx final, caching the bytes for
/// replay against retransmitted finals.
fn send_ack(tx: &mut Transaction, fx: &mut Effects<'_>, response: &Response) {
    match utils::create_ack(&tx.request, response) {
        Ok(ack) => {
            let wire = ack.encode();
            fx.send(tx.transport, tx.remote, &wire, &tx.key);
            tx.ack_wire = Some(wire);
        }
        Err(e) => warn!("{} could not build ACK: {}", tx.key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{invite_request, peer_addr, pump_timers, response_to, Harness};
    use crate::transaction::TransactionKey;
    use ringline_sip_core::StatusCode;
    use ringline_sip_transport::{Transport, TransportKind};

    fn new_transaction(h: &Harness) -> Transaction {
        let request = invite_request("z9hG4bK-ict-1");
        let key = TransactionKey::for_client_request(&request).unwrap();
        Transaction::new_client(key, request, peer_addr(), h.transport.kind())
    }

    fn started(h: &mut Harness) -> Transaction {
        let mut tx = new_transaction(h);
        let now = h.epoch;
        tx.start(&mut h.fx(now));
        tx
    }

    #[test]
    fn test_start_sends_invite_and_arms_timers() {
        let mut h = Harness::new(TransportKind::Udp);
        let tx = started(&mut h);

        assert_eq!(tx.state(), TransactionState::Calling);
        assert_eq!(h.transport.sent_count(), 1);
        assert_eq!(h.timers.len(), 2, "Timer A and Timer B");

        let wire = h.transport.last_sent().unwrap();
        let text = String::from_utf8_lossy(&wire).to_string();
        assert!(text.starts_with("INVITE sip:bob@biloxi.example.com SIP/2.0\r\n"));
    }

    #[test]
    fn test_retransmission_offsets_double_uncapped() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let fired = pump_timers(&mut h, &mut tx, 31_999);
        let offsets: Vec<u64> = fired
            .iter()
            .filter(|(_, kind, _)| *kind == TimerKind::A)
            .map(|(offset, _, _)| *offset)
            .collect();
        assert_eq!(offsets, vec![500, 1000, 2000, 4000, 8000, 16000]);

        // Initial send plus six retransmissions, all byte-identical.
        let payloads = h.transport.sent_payloads();
        assert_eq!(payloads.len(), 7);
        assert!(payloads.iter().all(|p| *p == payloads[0]));
    }

    #[test]
    fn test_timer_b_fires_before_final_retransmission() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let fired = pump_timers(&mut h, &mut tx, 32_000);
        // At 32s both Timer B and the seventh Timer A are due; B was
        // scheduled first and wins the tie, so the A that follows sees
        // a terminated transaction and does nothing.
        let at_deadline: Vec<(TimerKind, Disposition)> = fired
            .iter()
            .filter(|(offset, _, _)| *offset == 32_000)
            .map(|(_, kind, disposition)| (*kind, *disposition))
            .collect();
        assert_eq!(
            at_deadline,
            vec![
                (TimerKind::B, Disposition::Destroy),
                (TimerKind::A, Disposition::Continue),
            ]
        );
        assert_eq!(tx.state(), TransactionState::Terminated);
        assert_eq!(h.transport.sent_count(), 7, "no send at the deadline");

        let events = h.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransactionEvent::TransactionTimeout { .. }));
    }

    #[test]
    fn test_provisional_moves_to_proceeding_and_stops_timer_a() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let ringing = response_to(tx.request(), StatusCode::Ringing, Some("tag-180"));
        let now = h.at(300);
        let disposition = tx.on_response(&mut h.fx(now), &ringing);
        assert_eq!(disposition, Disposition::Continue);
        assert_eq!(tx.state(), TransactionState::Proceeding);

        let events = h.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransactionEvent::ProvisionalResponse { .. }));

        // No further INVITE retransmissions; Timer B is ignored in
        // Proceeding, an INVITE client waits on the TU from here.
        let fired = pump_timers(&mut h, &mut tx, 40_000);
        assert_eq!(h.transport.sent_count(), 1);
        assert!(fired.iter().all(|(_, _, d)| *d == Disposition::Continue));
        assert_eq!(tx.state(), TransactionState::Proceeding);
    }

    #[test]
    fn test_success_terminates_and_forwards_linger_retransmissions() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let ok = response_to(tx.request(), StatusCode::Ok, Some("tag-200"));
        let now = h.at(600);
        assert_eq!(tx.on_response(&mut h.fx(now), &ok), Disposition::Continue);
        assert_eq!(tx.state(), TransactionState::Terminated);
        assert_eq!(h.transport.sent_count(), 1, "no ACK from this layer for 2xx");

        // Retransmitted 2xx while lingering goes up again.
        let later = h.at(1_100);
        assert_eq!(tx.on_response(&mut h.fx(later), &ok), Disposition::Continue);
        let events = h.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TransactionEvent::SuccessResponse { .. }))
                .count(),
            2
        );

        // The linger timer eventually destroys the transaction.
        let fired = pump_timers(&mut h, &mut tx, 33_000);
        assert_eq!(fired.last().unwrap().1, TimerKind::Stale);
        assert_eq!(fired.last().unwrap().2, Disposition::Destroy);
    }

    #[test]
    fn test_failure_acks_and_replays_for_duplicates() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let busy = response_to(tx.request(), StatusCode::BusyHere, Some("tag-486"));
        let now = h.at(700);
        tx.on_response(&mut h.fx(now), &busy);
        assert_eq!(tx.state(), TransactionState::Completed);

        // INVITE then the generated ACK.
        let payloads = h.transport.sent_payloads();
        assert_eq!(payloads.len(), 2);
        let ack_text = String::from_utf8_lossy(&payloads[1]).to_string();
        assert!(ack_text.starts_with("ACK sip:bob@biloxi.example.com SIP/2.0\r\n"));
        assert!(ack_text.contains("tag=tag-486"), "ACK To tag from the response");

        // A retransmitted final replays the exact ACK and no event.
        let again = h.at(1_200);
        tx.on_response(&mut h.fx(again), &busy);
        let payloads = h.transport.sent_payloads();
        assert_eq!(payloads.len(), 3);
        assert_eq!(payloads[2], payloads[1]);

        let events = h.drain_events();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, TransactionEvent::FailureResponse { .. }))
                .count(),
            1
        );

        // Timer D fires 32s after entering Completed.
        let fired = pump_timers(&mut h, &mut tx, 40_000);
        assert_eq!(fired.last().unwrap().0, 32_700);
        assert_eq!(fired.last().unwrap().1, TimerKind::D);
        assert_eq!(fired.last().unwrap().2, Disposition::Destroy);
        assert_eq!(tx.state(), TransactionState::Terminated);
    }

    #[test]
    fn test_reliable_transport_skips_retransmit_and_collapses_d() {
        let mut h = Harness::new(TransportKind::Tcp);
        let mut tx = {
            let request = invite_request("z9hG4bK-ict-tcp");
            let key = TransactionKey::for_client_request(&request).unwrap();
            Transaction::new_client(key, request, peer_addr(), TransportKind::Tcp)
        };
        let now = h.epoch;
        tx.start(&mut h.fx(now));
        assert_eq!(h.timers.len(), 1, "only Timer B over TCP");

        let busy = response_to(tx.request(), StatusCode::BusyHere, Some("tag-486"));
        tx.on_response(&mut h.fx(h.at(100)), &busy);
        assert_eq!(tx.state(), TransactionState::Completed);

        // Zero-length Timer D: gone on the next drain.
        let fired = pump_timers(&mut h, &mut tx, 100);
        assert_eq!(fired, vec![(100, TimerKind::D, Disposition::Destroy)]);
    }

    #[test]
    fn test_late_provisional_in_completed_is_absorbed() {
        let mut h = Harness::new(TransportKind::Udp);
        let mut tx = started(&mut h);

        let busy = response_to(tx.request(), StatusCode::BusyHere, Some("tag-486"));
        tx.on_response(&mut h.fx(h.at(700)), &busy);
        h.drain_events();

        let ringing = response_to(tx.request(), StatusCode::Ringing, Some("tag-180"));
        let sends_before = h.transport.sent_count();
        tx.on_response(&mut h.fx(h.at(900)), &ringing);
        assert_eq!(tx.state(), TransactionState::Completed);
        assert_eq!(h.transport.sent_count(), sends_before);
        assert!(h.drain_events().is_empty());
    }
}
