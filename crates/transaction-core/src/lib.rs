//! SIP transaction layer for the ringline stack
//!
//! Implements the four RFC 3261 transaction state machines (INVITE and
//! non-INVITE, client and server sides) behind a single-task reactor.
//! The [`manager::Engine`] owns every live transaction, its timers and
//! the registered transports; transports feed it raw bytes over an
//! ingress channel, the transaction user drives it through an
//! [`manager::EngineHandle`] and listens on a stream of
//! [`events::TransactionEvent`]s. One deterministic processing pass at
//! a time: no locks around protocol state, no await points inside it.

mod client;
pub mod error;
pub mod events;
pub mod manager;
mod server;
#[cfg(test)]
pub(crate) mod testing;
pub mod timer;
pub mod transaction;
pub mod utils;

pub use error::{Error, Result};
pub use events::{EngineCommand, TransactionEvent};
pub use manager::{Engine, EngineConfig, EngineHandle, TransactionTable};
pub use timer::{TimerHandle, TimerKind, TimerQueue, TimerSettings};
pub use transaction::{
    Disposition, Transaction, TransactionKey, TransactionKind, TransactionState, MAGIC_COOKIE,
};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{EngineCommand, TransactionEvent};
    pub use crate::manager::{Engine, EngineConfig, EngineHandle};
    pub use crate::timer::{TimerKind, TimerSettings};
    pub use crate::transaction::{
        TransactionKey, TransactionKind, TransactionState, MAGIC_COOKIE,
    };
    pub use crate::utils;
}
