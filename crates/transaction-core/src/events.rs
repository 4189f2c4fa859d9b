//! Events flowing between the engine and the transaction user, plus
//! the commands the user hands back.

use std::net::SocketAddr;

use ringline_sip_core::{Message, Request, Response};
use ringline_sip_transport::TransportKind;

use crate::transaction::TransactionKey;

/// What the engine reports up to the transaction user (TU).
///
/// Events arrive on an unbounded channel in the order the engine
/// processed them, so a `TransactionTimeout` is always followed by the
/// `TransactionTerminated` for the same key.
#[derive(Debug, Clone)]
pub enum TransactionEvent {
    /// A request created a new server transaction
    NewRequest {
        /// Key of the created server transaction
        key: TransactionKey,
        /// The request as received
        request: Request,
        /// Source address of the request
        source: SocketAddr,
        /// Transport the request arrived on
        transport: TransportKind,
    },

    /// A client transaction received a 1xx response
    ProvisionalResponse {
        /// Key of the client transaction
        key: TransactionKey,
        /// The provisional response
        response: Response,
    },

    /// A client transaction received a 2xx response.
    ///
    /// For INVITE the TU owns the ACK; a retransmitted 2xx arriving
    /// while the transaction lingers is delivered again so the TU can
    /// re-send it.
    SuccessResponse {
        /// Key of the client transaction
        key: TransactionKey,
        /// The success response
        response: Response,
    },

    /// A client transaction received a 3xx-6xx final response. For
    /// INVITE the engine has already sent the ACK.
    FailureResponse {
        /// Key of the client transaction
        key: TransactionKey,
        /// The failure response
        response: Response,
    },

    /// An INVITE server transaction received the ACK for its final
    /// response
    AckReceived {
        /// Key of the INVITE server transaction
        key: TransactionKey,
        /// The ACK request
        request: Request,
    },

    /// A CANCEL arrived for a live INVITE server transaction. The
    /// CANCEL itself runs as its own server transaction and was
    /// announced through `NewRequest`; this event names the INVITE
    /// transaction being cancelled.
    CancelReceived {
        /// Key of the INVITE server transaction being cancelled
        key: TransactionKey,
        /// The CANCEL request
        cancel: Request,
    },

    /// A message arrived that matches no transaction and creates none,
    /// such as a stray response or an ACK for a 2xx
    UnmatchedMessage {
        /// The message as received
        message: Message,
        /// Source address of the message
        source: SocketAddr,
    },

    /// A transaction gave up waiting (Timers B, F or H)
    TransactionTimeout {
        /// Key of the timed-out transaction
        key: TransactionKey,
    },

    /// A send failed at the transport layer. The transaction, if any,
    /// keeps running; retransmission timers cover transient loss.
    TransportError {
        /// Key of the affected transaction, when one is involved
        key: Option<TransactionKey>,
        /// Error description
        error: String,
    },

    /// A transaction reached Terminated and left the engine's table
    TransactionTerminated {
        /// Key of the terminated transaction
        key: TransactionKey,
    },
}

/// Commands from the TU to the engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Start a client transaction for `request`
    SendRequest {
        /// Key the handle derived for the new transaction
        key: TransactionKey,
        /// The request to send
        request: Request,
        /// Where to send it
        destination: SocketAddr,
        /// Transport to carry it
        transport: TransportKind,
    },

    /// Send a response on an existing server transaction
    SendResponse {
        /// Key of the server transaction
        key: TransactionKey,
        /// The response to send
        response: Response,
    },

    /// Send a message without transaction state. Used for the ACK to a
    /// 2xx INVITE response, which RFC 3261 keeps out of the transaction
    /// layer.
    SendStateless {
        /// The message to send
        message: Message,
        /// Where to send it
        destination: SocketAddr,
        /// Transport to carry it
        transport: TransportKind,
    },

    /// Stop the engine loop and close registered transports
    Shutdown,
}
