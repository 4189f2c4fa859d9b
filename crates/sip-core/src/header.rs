//! Header storage for SIP messages.
//!
//! Each header occupies a [`HeaderSlot`] holding the raw logical line
//! exactly as received (folds included). The typed view is produced on
//! first access and cached; untouched slots re-encode verbatim, while
//! slots whose typed view was mutated re-encode canonically from it.

use std::borrow::Cow;
use std::cell::{Cell, OnceCell};
use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::types::{Address, CSeq, CallId, TypedHeader, Via};

/// Standard SIP header names, as defined in RFC 3261.
///
/// Compact forms ("v" for Via, "i" for Call-ID, ...) map to the same
/// variant when parsed; the canonical long name is used on output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    Contact,
    MaxForwards,
    ContentLength,
    ContentType,
    ContentEncoding,
    ContentDisposition,
    ContentLanguage,
    Expires,
    MinExpires,
    Route,
    RecordRoute,
    Allow,
    Supported,
    Require,
    Unsupported,
    ProxyRequire,
    UserAgent,
    Server,
    Subject,
    Date,
    Warning,
    Authorization,
    WwwAuthenticate,
    ProxyAuthenticate,
    ProxyAuthorization,
    Accept,
    AcceptEncoding,
    AcceptLanguage,
    AlertInfo,
    CallInfo,
    ErrorInfo,
    InReplyTo,
    MimeVersion,
    Organization,
    Priority,
    ReplyTo,
    RetryAfter,
    Timestamp,
    Event,
    /// Any header name this crate has no variant for
    Other(String),
}

impl HeaderName {
    /// Returns the canonical name used on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::Contact => "Contact",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentEncoding => "Content-Encoding",
            HeaderName::ContentDisposition => "Content-Disposition",
            HeaderName::ContentLanguage => "Content-Language",
            HeaderName::Expires => "Expires",
            HeaderName::MinExpires => "Min-Expires",
            HeaderName::Route => "Route",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::Allow => "Allow",
            HeaderName::Supported => "Supported",
            HeaderName::Require => "Require",
            HeaderName::Unsupported => "Unsupported",
            HeaderName::ProxyRequire => "Proxy-Require",
            HeaderName::UserAgent => "User-Agent",
            HeaderName::Server => "Server",
            HeaderName::Subject => "Subject",
            HeaderName::Date => "Date",
            HeaderName::Warning => "Warning",
            HeaderName::Authorization => "Authorization",
            HeaderName::WwwAuthenticate => "WWW-Authenticate",
            HeaderName::ProxyAuthenticate => "Proxy-Authenticate",
            HeaderName::ProxyAuthorization => "Proxy-Authorization",
            HeaderName::Accept => "Accept",
            HeaderName::AcceptEncoding => "Accept-Encoding",
            HeaderName::AcceptLanguage => "Accept-Language",
            HeaderName::AlertInfo => "Alert-Info",
            HeaderName::CallInfo => "Call-Info",
            HeaderName::ErrorInfo => "Error-Info",
            HeaderName::InReplyTo => "In-Reply-To",
            HeaderName::MimeVersion => "MIME-Version",
            HeaderName::Organization => "Organization",
            HeaderName::Priority => "Priority",
            HeaderName::ReplyTo => "Reply-To",
            HeaderName::RetryAfter => "Retry-After",
            HeaderName::Timestamp => "Timestamp",
            HeaderName::Event => "Event",
            HeaderName::Other(name) => name,
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Compact forms are single letters (RFC 3261 section 7.3.3).
        if s.len() == 1 {
            let name = match s.to_ascii_lowercase().as_str() {
                "v" => HeaderName::Via,
                "f" => HeaderName::From,
                "t" => HeaderName::To,
                "i" => HeaderName::CallId,
                "m" => HeaderName::Contact,
                "l" => HeaderName::ContentLength,
                "c" => HeaderName::ContentType,
                "e" => HeaderName::ContentEncoding,
                "s" => HeaderName::Subject,
                "k" => HeaderName::Supported,
                "o" => HeaderName::Event,
                other => HeaderName::Other(other.to_string()),
            };
            return Ok(name);
        }

        let name = match s.to_ascii_lowercase().as_str() {
            "via" => HeaderName::Via,
            "from" => HeaderName::From,
            "to" => HeaderName::To,
            "call-id" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "contact" => HeaderName::Contact,
            "max-forwards" => HeaderName::MaxForwards,
            "content-length" => HeaderName::ContentLength,
            "content-type" => HeaderName::ContentType,
            "content-encoding" => HeaderName::ContentEncoding,
            "content-disposition" => HeaderName::ContentDisposition,
            "content-language" => HeaderName::ContentLanguage,
            "expires" => HeaderName::Expires,
            "min-expires" => HeaderName::MinExpires,
            "route" => HeaderName::Route,
            "record-route" => HeaderName::RecordRoute,
            "allow" => HeaderName::Allow,
            "supported" => HeaderName::Supported,
            "require" => HeaderName::Require,
            "unsupported" => HeaderName::Unsupported,
            "proxy-require" => HeaderName::ProxyRequire,
            "user-agent" => HeaderName::UserAgent,
            "server" => HeaderName::Server,
            "subject" => HeaderName::Subject,
            "date" => HeaderName::Date,
            "warning" => HeaderName::Warning,
            "authorization" => HeaderName::Authorization,
            "www-authenticate" => HeaderName::WwwAuthenticate,
            "proxy-authenticate" => HeaderName::ProxyAuthenticate,
            "proxy-authorization" => HeaderName::ProxyAuthorization,
            "accept" => HeaderName::Accept,
            "accept-encoding" => HeaderName::AcceptEncoding,
            "accept-language" => HeaderName::AcceptLanguage,
            "alert-info" => HeaderName::AlertInfo,
            "call-info" => HeaderName::CallInfo,
            "error-info" => HeaderName::ErrorInfo,
            "in-reply-to" => HeaderName::InReplyTo,
            "mime-version" => HeaderName::MimeVersion,
            "organization" => HeaderName::Organization,
            "priority" => HeaderName::Priority,
            "reply-to" => HeaderName::ReplyTo,
            "retry-after" => HeaderName::RetryAfter,
            "timestamp" => HeaderName::Timestamp,
            "event" => HeaderName::Event,
            _ => {
                if s.is_empty() || !s.bytes().all(is_header_name_char) {
                    return Err(Error::Parser(format!("Invalid header name: {s}")));
                }
                HeaderName::Other(s.to_string())
            }
        };
        Ok(name)
    }
}

pub(crate) fn is_header_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.' | b'_' | b'+' | b'!' | b'%' | b'*' | b'~')
}

/// One header as it sits in a message.
///
/// `raw` is the complete logical line from the wire (name, colon and
/// folded continuations, without the final CRLF). Slots created by a
/// builder have no raw text and always encode from the typed value.
#[derive(Debug)]
pub struct HeaderSlot {
    raw: Bytes,
    name: HeaderName,
    value_off: usize,
    typed: OnceCell<Option<TypedHeader>>,
    dirty: Cell<bool>,
}

impl HeaderSlot {
    /// Wraps a raw logical line from the scanner. `value_off` points
    /// just past the colon and any leading whitespace.
    pub fn from_raw(name: HeaderName, raw: Bytes, value_off: usize) -> Self {
        HeaderSlot {
            raw,
            name,
            value_off,
            typed: OnceCell::new(),
            dirty: Cell::new(false),
        }
    }

    /// Creates a slot directly from a typed value (builder path).
    pub fn from_typed(name: HeaderName, typed: TypedHeader) -> Self {
        HeaderSlot {
            raw: Bytes::new(),
            name,
            value_off: 0,
            typed: OnceCell::from(Some(typed)),
            dirty: Cell::new(true),
        }
    }

    /// Creates a slot from a name and plain value text (builder path).
    pub fn from_parts(name: HeaderName, value: &str) -> Self {
        let mut raw = BytesMut::with_capacity(name.as_str().len() + 2 + value.len());
        raw.put_slice(name.as_str().as_bytes());
        raw.put_slice(b": ");
        let value_off = raw.len();
        raw.put_slice(value.as_bytes());
        HeaderSlot {
            raw: raw.freeze(),
            name,
            value_off,
            typed: OnceCell::new(),
            dirty: Cell::new(false),
        }
    }

    /// The header's name.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// True once the typed view has been modified, meaning this slot
    /// will re-encode canonically instead of replaying its raw bytes.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// The value text with line folds collapsed to single spaces.
    pub fn unfolded_value(&self) -> Cow<'_, str> {
        let value = &self.raw[self.value_off.min(self.raw.len())..];
        if !value.contains(&b'\r') && !value.contains(&b'\n') {
            return String::from_utf8_lossy(value);
        }

        let mut out = Vec::with_capacity(value.len());
        let mut i = 0;
        while i < value.len() {
            let b = value[i];
            if b == b'\r' || b == b'\n' {
                // A fold: CRLF (or stray CR/LF) plus the run of leading
                // whitespace on the next line collapses to one space.
                while i < value.len()
                    && matches!(value[i], b'\r' | b'\n' | b' ' | b'\t')
                {
                    i += 1;
                }
                out.push(b' ');
            } else {
                out.push(b);
                i += 1;
            }
        }
        match String::from_utf8_lossy(&out) {
            Cow::Borrowed(s) => Cow::Owned(s.to_string()),
            Cow::Owned(s) => Cow::Owned(s),
        }
    }

    /// Returns the typed view, parsing on first access.
    ///
    /// The outcome is cached either way: a slot that failed to parse
    /// keeps failing without re-running the parser.
    pub fn typed(&self) -> Result<&TypedHeader> {
        let cached = self
            .typed
            .get_or_init(|| TypedHeader::parse(&self.name, &self.unfolded_value()).ok());
        cached.as_ref().ok_or_else(|| Error::InvalidHeader {
            name: self.name.to_string(),
            offset: self.value_off,
        })
    }

    /// Returns a mutable typed view and marks the slot dirty.
    pub fn typed_mut(&mut self) -> Result<&mut TypedHeader> {
        if self.typed.get().is_none() {
            let parsed = TypedHeader::parse(&self.name, &self.unfolded_value()).ok();
            let _ = self.typed.set(parsed);
        }
        match self.typed.get_mut() {
            Some(Some(typed)) => {
                self.dirty.set(true);
                Ok(typed)
            }
            _ => Err(Error::InvalidHeader {
                name: self.name.to_string(),
                offset: self.value_off,
            }),
        }
    }

    /// Replaces the typed value outright, marking the slot dirty.
    pub fn set_typed(&mut self, typed: TypedHeader) {
        self.typed = OnceCell::from(Some(typed));
        self.dirty.set(true);
    }

    /// Writes this header (with trailing CRLF) into `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        if !self.dirty.get() && !self.raw.is_empty() {
            buf.put_slice(&self.raw);
            buf.put_slice(b"\r\n");
            return;
        }
        // Dirty or builder-made: canonical form from the typed view,
        // falling back to raw if there is no typed value to encode.
        match self.typed.get() {
            Some(Some(typed)) => {
                buf.put_slice(self.name.as_str().as_bytes());
                buf.put_slice(b": ");
                buf.put_slice(typed.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            _ => {
                buf.put_slice(&self.raw);
                buf.put_slice(b"\r\n");
            }
        }
    }
}

impl Clone for HeaderSlot {
    fn clone(&self) -> Self {
        // Bytes clones share the underlying buffer; the cache state is
        // carried over so a clone never re-parses what the original
        // already parsed.
        let typed = match self.typed.get() {
            Some(cached) => OnceCell::from(cached.clone()),
            None => OnceCell::new(),
        };
        HeaderSlot {
            raw: self.raw.clone(),
            name: self.name.clone(),
            value_off: self.value_off,
            typed,
            dirty: Cell::new(self.dirty.get()),
        }
    }
}

impl fmt::Display for HeaderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        let text = String::from_utf8_lossy(&buf);
        f.write_str(text.trim_end_matches("\r\n"))
    }
}

/// An ordered collection of header slots.
///
/// Order is preserved exactly as parsed or built; repeated headers keep
/// their positions. Lookups match on the canonical header name.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    slots: Vec<HeaderSlot>,
}

impl Headers {
    pub fn new() -> Self {
        Headers { slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Appends a slot at the end.
    pub fn push(&mut self, slot: HeaderSlot) {
        self.slots.push(slot);
    }

    /// Iterates over all slots in order.
    pub fn iter(&self) -> impl Iterator<Item = &HeaderSlot> {
        self.slots.iter()
    }

    /// First slot with the given name.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderSlot> {
        self.slots.iter().find(|slot| slot.name == *name)
    }

    /// Mutable access to the first slot with the given name.
    pub fn get_mut(&mut self, name: &HeaderName) -> Option<&mut HeaderSlot> {
        self.slots.iter_mut().find(|slot| slot.name == *name)
    }

    /// All slots with the given name, in order.
    pub fn get_all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a HeaderSlot> {
        self.slots.iter().filter(move |slot| slot.name == *name)
    }

    /// True if at least one slot has the given name.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.get(name).is_some()
    }

    /// Removes every slot with the given name, returning how many went.
    pub fn remove(&mut self, name: &HeaderName) -> usize {
        let before = self.slots.len();
        self.slots.retain(|slot| slot.name != *name);
        before - self.slots.len()
    }

    /// Replaces the first slot with this name (removing any others), or
    /// appends if the header was absent.
    pub fn set(&mut self, name: HeaderName, typed: TypedHeader) {
        match self.slots.iter().position(|slot| slot.name == name) {
            Some(pos) => {
                self.slots[pos] = HeaderSlot::from_typed(name.clone(), typed);
                let mut i = pos + 1;
                while i < self.slots.len() {
                    if self.slots[i].name == name {
                        self.slots.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.slots.push(HeaderSlot::from_typed(name, typed)),
        }
    }

    /// Typed view of the first header with this name. `None` when the
    /// header is absent or its value does not parse; use the slot's
    /// `typed()` to distinguish the two.
    pub fn typed(&self, name: &HeaderName) -> Option<&TypedHeader> {
        self.get(name).and_then(|slot| slot.typed().ok())
    }

    /// All Via hops across every Via header, top first.
    pub fn via(&self) -> Vec<&Via> {
        self.get_all(&HeaderName::Via)
            .filter_map(|slot| slot.typed().ok())
            .filter_map(|typed| typed.as_via())
            .flatten()
            .collect()
    }

    /// The topmost Via hop.
    pub fn top_via(&self) -> Option<&Via> {
        self.get_all(&HeaderName::Via)
            .filter_map(|slot| slot.typed().ok())
            .find_map(|typed| typed.as_via())
            .and_then(|hops| hops.first())
    }

    /// The branch parameter of the topmost Via hop.
    pub fn top_via_branch(&self) -> Option<&str> {
        self.top_via().and_then(|via| via.branch())
    }

    pub fn from_address(&self) -> Option<&Address> {
        match self.typed(&HeaderName::From) {
            Some(TypedHeader::From(addr)) => Some(addr),
            _ => None,
        }
    }

    pub fn to_address(&self) -> Option<&Address> {
        match self.typed(&HeaderName::To) {
            Some(TypedHeader::To(addr)) => Some(addr),
            _ => None,
        }
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        match self.typed(&HeaderName::CSeq) {
            Some(TypedHeader::CSeq(cseq)) => Some(cseq),
            _ => None,
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self.typed(&HeaderName::CallId) {
            Some(TypedHeader::CallId(call_id)) => Some(call_id),
            _ => None,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match self.typed(&HeaderName::ContentLength) {
            Some(TypedHeader::ContentLength(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn max_forwards(&self) -> Option<u32> {
        match self.typed(&HeaderName::MaxForwards) {
            Some(TypedHeader::MaxForwards(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn expires(&self) -> Option<u32> {
        match self.typed(&HeaderName::Expires) {
            Some(TypedHeader::Expires(n)) => Some(*n),
            _ => None,
        }
    }

    /// Writes every header in order, each with its CRLF.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        for slot in &self.slots {
            slot.encode_into(buf);
        }
    }
}
