//! SIP message model: requests, responses and the [`Message`] union.
//!
//! Messages carry their headers as raw slots (see [`crate::header`]),
//! so a message that was parsed and never modified encodes back to the
//! exact bytes it arrived as, start line aside.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::header::{HeaderName, Headers};
use crate::method::Method;
use crate::status::StatusCode;
use crate::types::TypedHeader;
use crate::uri::Uri;
use crate::version::Version;

/// A SIP request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method (INVITE, ACK, etc.)
    pub method: Method,
    /// Request-URI
    pub uri: Uri,
    /// SIP version (SIP/2.0)
    pub version: Version,
    /// Headers in wire order
    pub headers: Headers,
    /// Message body
    pub body: Bytes,
}

impl Request {
    /// Creates a new request with no headers or body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            version: Version::sip_2_0(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Replaces the body and keeps Content-Length in step.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.set(
            HeaderName::ContentLength,
            TypedHeader::ContentLength(self.body.len() as u64),
        );
    }

    /// The branch parameter of the topmost Via, if any.
    pub fn branch(&self) -> Option<&str> {
        self.headers.top_via_branch()
    }

    /// Serializes to wire format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.uri.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.version.to_string().as_bytes());
        buf.put_slice(b"\r\n");
        self.headers.encode_into(&mut buf);
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.encode()))
    }
}

/// A SIP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// SIP version (SIP/2.0)
    pub version: Version,
    /// Response status code
    pub status: StatusCode,
    /// Reason phrase override; `None` uses the code's canonical phrase
    pub reason: Option<String>,
    /// Headers in wire order
    pub headers: Headers,
    /// Message body
    pub body: Bytes,
}

impl Response {
    /// Creates a new response with no headers or body.
    pub fn new(status: StatusCode) -> Self {
        Response {
            version: Version::sip_2_0(),
            status,
            reason: None,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// The reason phrase that will go on the wire.
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Replaces the body and keeps Content-Length in step.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.set(
            HeaderName::ContentLength,
            TypedHeader::ContentLength(self.body.len() as u64),
        );
    }

    /// Serializes to wire format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.put_slice(self.version.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.as_u16().to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.reason_phrase().as_bytes());
        buf.put_slice(b"\r\n");
        self.headers.encode_into(&mut buf);
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.encode()))
    }
}

/// Either kind of SIP message.
#[derive(Debug, Clone)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Message::Response(_))
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(resp) => Some(resp),
            _ => None,
        }
    }

    pub fn into_request(self) -> Option<Request> {
        match self {
            Message::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Response(resp) => Some(resp),
            _ => None,
        }
    }

    /// The headers of either message kind.
    pub fn headers(&self) -> &Headers {
        match self {
            Message::Request(req) => &req.headers,
            Message::Response(resp) => &resp.headers,
        }
    }

    /// Serializes to wire format.
    pub fn encode(&self) -> Bytes {
        match self {
            Message::Request(req) => req.encode(),
            Message::Response(resp) => resp.encode(),
        }
    }
}

impl From<Request> for Message {
    fn from(req: Request) -> Self {
        Message::Request(req)
    }
}

impl From<Response> for Message {
    fn from(resp: Response) -> Self {
        Message::Response(resp)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(req) => req.fmt(f),
            Message::Response(resp) => resp.fmt(f),
        }
    }
}
