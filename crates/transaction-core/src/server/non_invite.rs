//! Non-INVITE server transaction, RFC 3261 section 17.2.2.
//!
//! Trying until the TU responds; a provisional moves to Proceeding, a
//! final to Completed. Completed replays the final against request
//! retransmissions until Timer J ends the transaction. The server
//! never retransmits on its own timer; only the client does.

use tracing::{debug, warn};

use ringline_sip_core::{Request, Response};

use crate::error::{Error, Result};
use crate::timer::TimerKind;
use crate::transaction::{Disposition, Effects, Transaction, TransactionState};

pub(crate) fn start(tx: &mut Transaction, _fx: &mut Effects<'_>) {
    tx.transition(TransactionState::Trying);
}

pub(crate) fn on_request(
    tx: &mut Transaction,
    fx: &mut Effects<'_>,
    _request: &Request,
) -> Disposition {
    match tx.state {
        TransactionState::Trying => {
            // Nothing has been sent yet, so there is nothing to replay.
            debug!("{} absorbed retransmission before any response", tx.key);
            Disposition::Continue
        }
        TransactionState::Proceeding | TransactionState::Completed => {
            debug!("{} replaying last response to retransmission", tx.key);
            tx.send_cached_response(fx);
            Disposition::Continue
        }
        state => {
            warn!("{} ignoring request in state {}", tx.key, state);
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
        TransactionState::Trying | TransactionState::Proceeding => {
            let wire = response.encode();
            fx.send(tx.transport, tx.remote, &wire, &tx.key);
            tx.last_response = Some(wire);

            if status.is_provisional() {
                tx.transition(TransactionState::Proceeding);
            } else {
                tx.transition(TransactionState::Completed);
                let delay = tx.wait_delay(fx.settings.wait_time_j);
                tx.arm_guard(fx, TimerKind::J, delay);
            }
            Ok(Disposition::Continue)
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
    let _ = fx;
    match kind {
        TimerKind::J => {
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
