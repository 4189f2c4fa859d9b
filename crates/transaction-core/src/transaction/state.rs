//! Transaction states and the legal transitions between them,
//! following the four state machines of RFC 3261 section 17.

use std::fmt;

/// Lifecycle state of a transaction.
///
/// `Calling` belongs to INVITE client transactions, `Trying` to the
/// non-INVITE machines, `Confirmed` to INVITE server transactions.
/// Every machine ends in `Terminated`, at which point the engine drops
/// the transaction from its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created but not yet started
    Initial,
    /// INVITE client: request sent, nothing heard yet
    Calling,
    /// Non-INVITE: request sent (client) or received (server)
    Trying,
    /// A provisional response has been received or sent
    Proceeding,
    /// A final response has been received or sent; absorbing
    /// retransmissions or waiting for the ACK
    Completed,
    /// INVITE server: ACK received for a non-2xx final
    Confirmed,
    /// Done; the engine destroys the transaction
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(&self) -> bool {
        *self == TransactionState::Terminated
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Initial => "Initial",
            TransactionState::Calling => "Calling",
            TransactionState::Trying => "Trying",
            TransactionState::Proceeding => "Proceeding",
            TransactionState::Completed => "Completed",
            TransactionState::Confirmed => "Confirmed",
            TransactionState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Which of the four RFC 3261 state machines a transaction runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    InviteClient,
    NonInviteClient,
    InviteServer,
    NonInviteServer,
}

impl TransactionKind {
    pub fn is_client(&self) -> bool {
        matches!(
            self,
            TransactionKind::InviteClient | TransactionKind::NonInviteClient
        )
    }

    pub fn is_invite(&self) -> bool {
        matches!(
            self,
            TransactionKind::InviteClient | TransactionKind::InviteServer
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::InviteClient => "INVITE client",
            TransactionKind::NonInviteClient => "non-INVITE client",
            TransactionKind::InviteServer => "INVITE server",
            TransactionKind::NonInviteServer => "non-INVITE server",
        };
        f.write_str(name)
    }
}

/// True when `from -> to` is a legal move for `kind`.
///
/// Staying in place is always legal, entering `Terminated` is always
/// legal, and nothing leaves `Terminated`. Everything else follows the
/// per-machine arrows from the RFC diagrams; backward moves are never
/// allowed.
pub fn validate_transition(
    kind: TransactionKind,
    from: TransactionState,
    to: TransactionState,
) -> bool {
    use TransactionState::*;

    if from == to {
        return true;
    }
    if from == Terminated {
        return false;
    }
    if to == Terminated {
        return true;
    }

    match kind {
        TransactionKind::InviteClient => matches!(
            (from, to),
            (Initial, Calling)
                | (Calling, Proceeding)
                | (Calling, Completed)
                | (Proceeding, Completed)
        ),
        TransactionKind::NonInviteClient => matches!(
            (from, to),
            (Initial, Trying)
                | (Trying, Proceeding)
                | (Trying, Completed)
                | (Proceeding, Completed)
        ),
        TransactionKind::InviteServer => matches!(
            (from, to),
            (Initial, Proceeding) | (Proceeding, Completed) | (Completed, Confirmed)
        ),
        TransactionKind::NonInviteServer => matches!(
            (from, to),
            (Initial, Trying)
                | (Trying, Proceeding)
                | (Trying, Completed)
                | (Proceeding, Completed)
        ),
    }
}
