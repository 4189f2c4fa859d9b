//! Non-INVITE client transaction, RFC 3261 section 17.1.2.
//!
//! Unlike INVITE, the request keeps retransmitting on Timer E through
//! Proceeding, and Timer F bounds the whole wait in both states. There
//! is no ACK anywhere; a final response moves to Completed, where
//! Timer K absorbs response retransmissions.

use tracing::{debug, warn};

use ringline_sip_core::Response;

use crate::events::TransactionEvent;
use crate::timer::TimerKind;
use crate::transaction::{Disposition, Effects, Transaction, TransactionState};

pub(crate) fn start(tx: &mut Transaction, fx: &mut Effects<'_>) {
    tx.send_request_wire(fx);
    if !tx.transition(TransactionState::Trying) {
        return;
    }
    if !tx.reliable() {
        tx.arm_retransmit(fx, TimerKind::E);
    }
    let timeout = fx.settings.transaction_timeout;
    tx.arm_guard(fx, TimerKind::F, timeout);
}

pub(crate) fn on_response(
    tx: &mut Transaction,
    fx: &mut Effects<'_>,
    response: &Response,
) -> Disposition {
    let status = response.status;
    match tx.state {
        TransactionState::Trying | TransactionState::Proceeding if status.is_provisional() => {
            // Timer E keeps running: non-INVITE requests retransmit
            // until a final arrives.
            tx.transition(TransactionState::Proceeding);
            fx.emit(TransactionEvent::ProvisionalResponse {
                key: tx.key.clone(),
                response: response.clone(),
            });
            Disposition::Continue
        }
        TransactionState::Trying | TransactionState::Proceeding => {
            tx.cancel_timers(fx);
            let event = if status.is_success() {
                TransactionEvent::SuccessResponse {
                    key: tx.key.clone(),
                    response: response.clone(),
                }
            } else {
                TransactionEvent::FailureResponse {
                    key: tx.key.clone(),
                    response: response.clone(),
                }
            };
            fx.emit(event);
            tx.transition(TransactionState::Completed);
            let delay = tx.wait_delay(fx.settings.wait_time_k);
            tx.arm_guard(fx, TimerKind::K, delay);
            Disposition::Continue
        }
        TransactionState::Completed | TransactionState::Terminated => {
            debug!("{} absorbed retransmitted {}", tx.key, status.as_u16());
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
        TimerKind::E => {
            if matches!(
                tx.state,
                TransactionState::Trying | TransactionState::Proceeding
            ) {
                debug!("{} retransmitting request", tx.key);
                tx.send_request_wire(fx);
                let cap = fx.settings.t2;
                tx.rearm_retransmit(fx, TimerKind::E, Some(cap));
            }
            Disposition::Continue
        }
        TimerKind::F => {
            if matches!(
                tx.state,
                TransactionState::Trying | TransactionState::Proceeding
            ) {
                warn!("{} timed out with no final response", tx.key);
                fx.emit(TransactionEvent::TransactionTimeout {
                    key: tx.key.clone(),
                });
                tx.transition(TransactionState::Terminated);
                Disposition::Destroy
            } else {
                Disposition::Continue
            }
        }
        TimerKind::K => {
            if tx.state == TransactionState::Completed {
                tx.transition(TransactionState::Terminated);
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
