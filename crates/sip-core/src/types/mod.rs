//! Typed views of SIP header values.
//!
//! Headers are stored raw and only lifted into these types on demand.
//! The [`TypedHeader`] union covers the headers the transaction layer
//! reads or rewrites; anything else degrades to [`TypedHeader::Opaque`]
//! and re-encodes byte for byte.

pub mod address;
pub mod param;
pub mod via;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::header::HeaderName;
use crate::method::Method;

pub use address::Address;
pub use param::Param;
pub use via::Via;

/// Typed CSeq header: sequence number plus method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    /// Creates a new CSeq header.
    pub fn new(seq: u32, method: Method) -> Self {
        Self { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split_ascii_whitespace();
        let seq = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| Error::Parser(format!("Invalid CSeq: {s}")))?;
        let method = parts
            .next()
            .ok_or_else(|| Error::Parser(format!("Invalid CSeq: {s}")))?
            .parse::<Method>()?;
        if parts.next().is_some() {
            return Err(Error::Parser(format!("Invalid CSeq: {s}")));
        }
        Ok(CSeq { seq, method })
    }
}

/// Typed Call-ID header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallId(pub String);

impl CallId {
    pub fn new(value: impl Into<String>) -> Self {
        CallId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value of a Contact header: either the REGISTER wildcard `*`
/// or a list of addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValue {
    Star,
    Addresses(Vec<Address>),
}

impl fmt::Display for ContactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactValue::Star => f.write_str("*"),
            ContactValue::Addresses(addrs) => {
                let mut first = true;
                for addr in addrs {
                    if !first {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", addr)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

/// A parsed header value, tagged by which header it came from.
///
/// One variant per header the signaling core interprets. The `Display`
/// impl renders the canonical value text (without the header name), so
/// a rewritten header can be serialized from this view alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedHeader {
    /// Via hops, in top-to-bottom order
    Via(Vec<Via>),
    /// From address with its tag
    From(Address),
    /// To address with its tag
    To(Address),
    /// Contact binding(s)
    Contact(ContactValue),
    /// Route set entries
    Route(Vec<Address>),
    /// Record-Route entries
    RecordRoute(Vec<Address>),
    /// CSeq number and method
    CSeq(CSeq),
    /// Call-ID
    CallId(CallId),
    /// Max-Forwards hop count
    MaxForwards(u32),
    /// Content-Length in bytes
    ContentLength(u64),
    /// Expires in seconds
    Expires(u32),
    /// Comma-separated token lists (Allow, Supported, Require, ...)
    TokenList(Vec<String>),
    /// Any header this crate does not interpret; value kept verbatim
    Opaque(String),
}

#[cfg(test)]
thread_local! {
    /// Counts calls into [`TypedHeader::parse`] so tests can assert the
    /// lazy header cache parses each slot at most once.
    pub(crate) static PARSE_CALLS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

impl TypedHeader {
    /// Parses a header value into its typed form, dispatching on the
    /// header name. Unknown names come back as [`TypedHeader::Opaque`].
    pub fn parse(name: &HeaderName, value: &str) -> Result<Self> {
        #[cfg(test)]
        PARSE_CALLS.with(|c| c.set(c.get() + 1));

        let value = value.trim();
        let typed = match name {
            HeaderName::Via => {
                let mut hops = Vec::new();
                for part in split_comma_values(value) {
                    let (rest, via) = via::parse_via(part)
                        .map_err(|_| invalid(name, value))?;
                    if !rest.trim().is_empty() {
                        return Err(invalid(name, value));
                    }
                    hops.push(via);
                }
                if hops.is_empty() {
                    return Err(invalid(name, value));
                }
                TypedHeader::Via(hops)
            }
            HeaderName::From => TypedHeader::From(parse_single_address(name, value)?),
            HeaderName::To => TypedHeader::To(parse_single_address(name, value)?),
            HeaderName::Contact => {
                if value == "*" {
                    TypedHeader::Contact(ContactValue::Star)
                } else {
                    TypedHeader::Contact(ContactValue::Addresses(parse_address_list(
                        name, value,
                    )?))
                }
            }
            HeaderName::Route => TypedHeader::Route(parse_address_list(name, value)?),
            HeaderName::RecordRoute => {
                TypedHeader::RecordRoute(parse_address_list(name, value)?)
            }
            HeaderName::CSeq => {
                TypedHeader::CSeq(value.parse().map_err(|_| invalid(name, value))?)
            }
            HeaderName::CallId => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(invalid(name, value));
                }
                TypedHeader::CallId(CallId::new(value))
            }
            HeaderName::MaxForwards => {
                TypedHeader::MaxForwards(value.parse().map_err(|_| invalid(name, value))?)
            }
            HeaderName::ContentLength => {
                TypedHeader::ContentLength(value.parse().map_err(|_| invalid(name, value))?)
            }
            HeaderName::Expires => {
                TypedHeader::Expires(value.parse().map_err(|_| invalid(name, value))?)
            }
            HeaderName::Allow
            | HeaderName::Supported
            | HeaderName::Require
            | HeaderName::Unsupported => TypedHeader::TokenList(
                value
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            ),
            _ => TypedHeader::Opaque(value.to_string()),
        };
        Ok(typed)
    }

    /// Returns the Via hops if this is a Via header.
    pub fn as_via(&self) -> Option<&[Via]> {
        match self {
            TypedHeader::Via(hops) => Some(hops),
            _ => None,
        }
    }

    /// Returns the address if this is a From or To header.
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            TypedHeader::From(addr) | TypedHeader::To(addr) => Some(addr),
            _ => None,
        }
    }
}

fn invalid(name: &HeaderName, _value: &str) -> Error {
    Error::InvalidHeader {
        name: name.to_string(),
        offset: 0,
    }
}

fn parse_single_address(name: &HeaderName, value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .map_err(|_| invalid(name, value))
}

fn parse_address_list(name: &HeaderName, value: &str) -> Result<Vec<Address>> {
    let mut out = Vec::new();
    for part in split_comma_values(value) {
        out.push(part.parse::<Address>().map_err(|_| invalid(name, value))?);
    }
    if out.is_empty() {
        return Err(invalid(name, value));
    }
    Ok(out)
}

impl fmt::Display for TypedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedHeader::Via(hops) => {
                let mut first = true;
                for hop in hops {
                    if !first {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", hop)?;
                    first = false;
                }
                Ok(())
            }
            TypedHeader::From(addr) | TypedHeader::To(addr) => write!(f, "{}", addr),
            TypedHeader::Contact(value) => write!(f, "{}", value),
            TypedHeader::Route(addrs) | TypedHeader::RecordRoute(addrs) => {
                let mut first = true;
                for addr in addrs {
                    if !first {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", addr)?;
                    first = false;
                }
                Ok(())
            }
            TypedHeader::CSeq(cseq) => write!(f, "{}", cseq),
            TypedHeader::CallId(call_id) => write!(f, "{}", call_id),
            TypedHeader::MaxForwards(n) => write!(f, "{}", n),
            TypedHeader::ContentLength(n) => write!(f, "{}", n),
            TypedHeader::Expires(n) => write!(f, "{}", n),
            TypedHeader::TokenList(tokens) => f.write_str(&tokens.join(", ")),
            TypedHeader::Opaque(value) => f.write_str(value),
        }
    }
}

/// Splits a header value on commas, skipping commas inside quoted
/// strings and angle brackets. Yields trimmed, non-empty pieces.
pub(crate) fn split_comma_values(value: &str) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0usize;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                pieces.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&value[start..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
}
