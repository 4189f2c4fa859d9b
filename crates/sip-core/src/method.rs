use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// SIP request method, as defined in RFC 3261 and its common extensions.
///
/// Methods not known to this crate are carried through verbatim as
/// `Extension`, so proxies built on top never reject traffic just
/// because a method postdates us.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// INVITE: initiates a session
    Invite,
    /// ACK: confirms a final response to INVITE
    Ack,
    /// BYE: terminates a session
    Bye,
    /// CANCEL: cancels a pending request
    Cancel,
    /// REGISTER: binds an address-of-record to a contact
    Register,
    /// OPTIONS: queries capabilities
    Options,
    /// SUBSCRIBE: requests event notification (RFC 6665)
    Subscribe,
    /// NOTIFY: delivers an event notification (RFC 6665)
    Notify,
    /// UPDATE: modifies session state without impacting dialog state (RFC 3311)
    Update,
    /// REFER: asks the recipient to issue a request (RFC 3515)
    Refer,
    /// INFO: carries mid-session information (RFC 6086)
    Info,
    /// MESSAGE: instant message transport (RFC 3428)
    Message,
    /// PRACK: acknowledges a provisional response (RFC 3262)
    Prack,
    /// PUBLISH: publishes event state (RFC 3903)
    Publish,
    /// Any other token-valued method
    Extension(String),
}

impl Method {
    /// Returns the canonical wire form of this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Register => "REGISTER",
            Method::Options => "OPTIONS",
            Method::Subscribe => "SUBSCRIBE",
            Method::Notify => "NOTIFY",
            Method::Update => "UPDATE",
            Method::Refer => "REFER",
            Method::Info => "INFO",
            Method::Message => "MESSAGE",
            Method::Prack => "PRACK",
            Method::Publish => "PUBLISH",
            Method::Extension(s) => s,
        }
    }

    /// True for INVITE, which gets its own transaction machinery.
    pub fn is_invite(&self) -> bool {
        matches!(self, Method::Invite)
    }

    /// True for ACK, which never creates a transaction of its own.
    pub fn is_ack(&self) -> bool {
        matches!(self, Method::Ack)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 3261 token characters, the charset method names are drawn from.
pub(crate) fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'-' | b'.' | b'!' | b'%' | b'*' | b'_' | b'+' | b'`' | b'\'' | b'~'
        )
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Method names are case-sensitive tokens (RFC 3261 section 7.1).
        let method = match s {
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "REGISTER" => Method::Register,
            "OPTIONS" => Method::Options,
            "SUBSCRIBE" => Method::Subscribe,
            "NOTIFY" => Method::Notify,
            "UPDATE" => Method::Update,
            "REFER" => Method::Refer,
            "INFO" => Method::Info,
            "MESSAGE" => Method::Message,
            "PRACK" => Method::Prack,
            "PUBLISH" => Method::Publish,
            _ => {
                if s.is_empty() || !s.bytes().all(is_token_char) {
                    return Err(Error::InvalidMethod);
                }
                Method::Extension(s.to_string())
            }
        };
        Ok(method)
    }
}
