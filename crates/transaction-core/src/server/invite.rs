//! INVITE server transaction, RFC 3261 section 17.2.1.
//!
//! Lives in Proceeding until the TU answers. A non-2xx final moves to
//! Completed, where Timer G retransmits the response and Timer H bounds
//! the wait for the ACK; the ACK moves to Confirmed and Timer I winds
//! the transaction down. A 2xx terminates at once since the TU owns
//! 2xx retransmission, with a linger so retransmitted INVITEs replay
//! the 2xx and the ACK still reaches the TU.

use tracing::{debug, warn};

use ringline_sip_core::{Method, Request, Response};

use crate::error::{Error, Result};
use crate::events::TransactionEvent;
use crate::timer::TimerKind;
use crate::transaction::{Disposition, Effects, Transaction, TransactionState};

pub(crate) fn start(tx: &mut Transaction, _fx: &mut Effects<'_>) {
    tx.transition(TransactionState::Proceeding);
}

pub(crate) fn on_request(
    tx: &mut Transaction,
    fx: &mut Effects<'_>,
    request: &Request,
) -> Disposition {
    if request.method == Method::Ack {
        return on_ack(tx, fx, request);
    }

    match tx.state {
        TransactionState::Proceeding | TransactionState::Completed => {
            // Retransmitted INVITE: replay whatever was last sent. If
            // nothing has been sent yet there is nothing to replay.
            debug!("{} replaying response to retransmitted INVITE", tx.key);
            tx.send_cached_response(fx);
            Disposition::Continue
        }
        TransactionState::Terminated => {
            // Lingering after a 2xx; the retransmitted INVITE means the
            // 2xx was lost.
            tx.send_cached_response(fx);
            Disposition::Continue
        }
        state => {
            debug!("{} absorbed retransmitted INVITE in {}", tx.key, state);
            Disposition::Continue
        }
    }
}

fn on_ack(tx: &mut Transaction, fx: &mut Effects<'_>, request: &Request) -> Disposition {
    match tx.state {
        TransactionState::Completed => {
            tx.cancel_timers(fx);
            if tx.transition(TransactionState::Confirmed) {
                fx.emit(TransactionEvent::AckReceived {
                    key: tx.key.clone(),
                    request: request.clone(),
                });
                let delay = tx.wait_delay(fx.settings.wait_time_i);
                tx.arm_guard(fx, TimerKind::I, delay);
            }
            Disposition::Continue
        }
        TransactionState::Confirmed => {
            debug!("{} absorbed retransmitted ACK", tx.key);
            Disposition::Continue
        }
        TransactionState::Terminated => {
            // ACK for the 2xx arriving during the linger. It belongs to
            // the TU, which matched the 2xx it sent.
            fx.emit(TransactionEvent::AckReceived {
                key: tx.key.clone(),
                request: request.clone(),
            });
            Disposition::Continue
        }
        state => {
            warn!("{} unexpected ACK in {}", tx.key, state);
            Disposition::Continue
        }
    }
}

pub(crate) fn send_response(
    tx: &mut Transaction,
    fx: &mut Effects<'_>,
    response: &Response,
) -> Result<Disposition> {
    let status = response.status;
    match tx.state {
        TransactionState::Proceeding => {
            let wire = response.encode();
            fx.send(tx.transport, tx.remote, &wire, &tx.key);
            tx.last_response = Some(wire);

            if status.is_provisional() {
                Ok(Disposition::Continue)
            } else if status.is_success() {
                // The TU retransmits 2xx end-to-end and fields the ACK.
                // Terminate now, linger for matching only.
                tx.transition(TransactionState::Terminated);
                let linger = tx.wait_delay(fx.settings.stale_linger);
                tx.arm_guard(fx, TimerKind::Stale, linger);
                Ok(Disposition::Continue)
            } else {
                tx.transition(TransactionState::Completed);
                if !tx.reliable() {
                    tx.arm_retransmit(fx, TimerKind::G);
                }
                let timeout = fx.settings.transaction_timeout;
                tx.arm_guard(fx, TimerKind::H, timeout);
                Ok(Disposition::Continue)
            }
        }
        state => Err(Error::InvalidStateTransition(format!(
            "cannot send {} for {} in state {}",
            status.as_u16(),
            tx.key,
            state
        ))),
    }
}

pub(crate) fn on_timer(tx: &mut Transaction, fx: &mut Effects<'_>, kind: TimerKind) -> Disposition {
    match kind {
        TimerKind::G => {
            if tx.state == TransactionState::Completed {
                debug!("{} retransmitting final response", tx.key);
                tx.send_cached_response(fx);
                let cap = fx.settings.t2;
                tx.rearm_retransmit(fx, TimerKind::G, Some(cap));
            }
            Disposition::Continue
        }
        TimerKind::H => {
            if tx.state == TransactionState::Completed {
                warn!("{} never received an ACK", tx.key);
                fx.emit(TransactionEvent::TransactionTimeout {
                    key: tx.key.clone(),
                });
                tx.transition(TransactionState::Terminated);
                Disposition::Destroy
            } else {
                Disposition::Continue
            }
        }
        TimerKind::I => {
            if tx.state == TransactionState::Confirmed {
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
