//! Core SIP protocol implementation for ringline
//!
//! This crate provides the fundamental SIP message types, lazy header
//! parsing, and wire framing for the ringline stack. Messages coming
//! off a transport are boundary-scanned once by [`scanner::Scanner`];
//! header values stay as raw bytes until a caller asks for the typed
//! form, and unmodified headers are re-emitted verbatim on encode.

// Declare modules
pub mod builder;
pub mod error;
pub mod header;
pub mod message;
pub mod method;
pub mod parser;
pub mod scanner;
pub mod status;
pub mod types;
pub mod uri;
pub mod version;

// Re-export key public items
pub use builder::{RequestBuilder, ResponseBuilder};
pub use error::{Error, Result};
pub use header::{HeaderName, HeaderSlot, Headers};
pub use message::{Message, Request, Response};
pub use method::Method;
pub use parser::parse_message;
pub use scanner::Scanner;
pub use status::StatusCode;
pub use types::{Address, CSeq, CallId, ContactValue, Param, TypedHeader, Via};
pub use uri::{Scheme, Uri};
pub use version::Version;

/// Re-export of common types and functions
pub mod prelude {
    pub use crate::builder::{RequestBuilder, ResponseBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::header::{HeaderName, HeaderSlot, Headers};
    pub use crate::message::{Message, Request, Response};
    pub use crate::method::Method;
    pub use crate::parser::{parse_message, MAX_BODY_SIZE, MAX_HEADER_COUNT, MAX_LINE_LENGTH};
    pub use crate::scanner::Scanner;
    pub use crate::status::StatusCode;
    pub use crate::types::{Address, CSeq, CallId, ContactValue, Param, TypedHeader, Via};
    pub use crate::uri::{Scheme, Uri};
    pub use crate::version::Version;
}
