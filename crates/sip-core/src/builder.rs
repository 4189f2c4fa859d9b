//! Fluent builders for requests and responses.
//!
//! Headers are appended in call order, so builders produce messages
//! with the header layout the caller wrote down. `build()` fills in a
//! Content-Length when none was set.

use std::str::FromStr;

use bytes::Bytes;

use crate::error::Result;
use crate::header::{HeaderName, HeaderSlot, Headers};
use crate::message::{Request, Response};
use crate::method::Method;
use crate::status::StatusCode;
use crate::types::{Address, CSeq, CallId, ContactValue, TypedHeader, Via};
use crate::uri::Uri;

fn push_typed(headers: &mut Headers, name: HeaderName, typed: TypedHeader) {
    headers.push(HeaderSlot::from_typed(name, typed));
}

/// Builder for SIP request messages
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Create a new RequestBuilder with the specified method and URI
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri = Uri::from_str(uri)?;
        Ok(Self {
            request: Request::new(method, uri),
        })
    }

    /// Create an INVITE request
    pub fn invite(uri: &str) -> Result<Self> {
        Self::new(Method::Invite, uri)
    }

    /// Create a REGISTER request
    pub fn register(uri: &str) -> Result<Self> {
        Self::new(Method::Register, uri)
    }

    /// Create an OPTIONS request
    pub fn options(uri: &str) -> Result<Self> {
        Self::new(Method::Options, uri)
    }

    /// Create a BYE request
    pub fn bye(uri: &str) -> Result<Self> {
        Self::new(Method::Bye, uri)
    }

    /// Add a Via header. A `branch` of `None` leaves the hop without
    /// one, for callers that stamp the branch themselves later.
    pub fn via(mut self, transport: &str, host: &str, branch: Option<&str>) -> Self {
        let mut via = Via::new(transport, host, None);
        if let Some(branch) = branch {
            via.set_branch(branch);
        }
        push_typed(
            &mut self.request.headers,
            HeaderName::Via,
            TypedHeader::Via(vec![via]),
        );
        self
    }

    /// Add a From header; an empty display name is omitted.
    pub fn from(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Result<Self> {
        let mut addr = Address::new(Uri::from_str(uri)?);
        if !display_name.is_empty() {
            addr.display_name = Some(display_name.to_string());
        }
        if let Some(tag) = tag {
            addr.set_tag(tag);
        }
        push_typed(
            &mut self.request.headers,
            HeaderName::From,
            TypedHeader::From(addr),
        );
        Ok(self)
    }

    /// Add a To header; an empty display name is omitted.
    pub fn to(mut self, display_name: &str, uri: &str, tag: Option<&str>) -> Result<Self> {
        let mut addr = Address::new(Uri::from_str(uri)?);
        if !display_name.is_empty() {
            addr.display_name = Some(display_name.to_string());
        }
        if let Some(tag) = tag {
            addr.set_tag(tag);
        }
        push_typed(
            &mut self.request.headers,
            HeaderName::To,
            TypedHeader::To(addr),
        );
        Ok(self)
    }

    /// Add a Call-ID header
    pub fn call_id(mut self, call_id: &str) -> Self {
        push_typed(
            &mut self.request.headers,
            HeaderName::CallId,
            TypedHeader::CallId(CallId::new(call_id)),
        );
        self
    }

    /// Add a CSeq header using the request's own method
    pub fn cseq(mut self, seq: u32) -> Self {
        let method = self.request.method.clone();
        push_typed(
            &mut self.request.headers,
            HeaderName::CSeq,
            TypedHeader::CSeq(CSeq::new(seq, method)),
        );
        self
    }

    /// Add a Max-Forwards header
    pub fn max_forwards(mut self, value: u32) -> Self {
        push_typed(
            &mut self.request.headers,
            HeaderName::MaxForwards,
            TypedHeader::MaxForwards(value),
        );
        self
    }

    /// Add a Contact header
    pub fn contact(mut self, uri: &str) -> Result<Self> {
        let addr = Address::new(Uri::from_str(uri)?);
        push_typed(
            &mut self.request.headers,
            HeaderName::Contact,
            TypedHeader::Contact(ContactValue::Addresses(vec![addr])),
        );
        Ok(self)
    }

    /// Add an Expires header
    pub fn expires(mut self, seconds: u32) -> Self {
        push_typed(
            &mut self.request.headers,
            HeaderName::Expires,
            TypedHeader::Expires(seconds),
        );
        self
    }

    /// Add any header from plain value text
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        self.request
            .headers
            .push(HeaderSlot::from_parts(name, value));
        self
    }

    /// Set the message body (Content-Length is finalized by `build`)
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Finish the request, appending a Content-Length if none was set.
    pub fn build(mut self) -> Request {
        if !self.request.headers.contains(&HeaderName::ContentLength) {
            push_typed(
                &mut self.request.headers,
                HeaderName::ContentLength,
                TypedHeader::ContentLength(self.request.body.len() as u64),
            );
        }
        self.request
    }
}

/// Builder for SIP response messages
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new ResponseBuilder with the specified status code
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Override the canonical reason phrase
    pub fn reason(mut self, reason: &str) -> Self {
        self.response.reason = Some(reason.to_string());
        self
    }

    /// Add any header from plain value text
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        self.response
            .headers
            .push(HeaderSlot::from_parts(name, value));
        self
    }

    /// Add a typed header
    pub fn typed_header(mut self, name: HeaderName, typed: TypedHeader) -> Self {
        push_typed(&mut self.response.headers, name, typed);
        self
    }

    /// Set the message body (Content-Length is finalized by `build`)
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    /// Finish the response, appending a Content-Length if none was set.
    pub fn build(mut self) -> Response {
        if !self.response.headers.contains(&HeaderName::ContentLength) {
            push_typed(
                &mut self.response.headers,
                HeaderName::ContentLength,
                TypedHeader::ContentLength(self.response.body.len() as u64),
            );
        }
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;

    #[test]
    fn test_build_invite_round_trips() {
        let request = RequestBuilder::invite("sip:bob@biloxi.example.com")
            .unwrap()
            .via("UDP", "pc33.atlanta.example.com", Some("z9hG4bK776asdhds"))
            .max_forwards(70)
            .from("Alice", "sip:alice@atlanta.example.com", Some("1928301774"))
            .unwrap()
            .to("Bob", "sip:bob@biloxi.example.com", None)
            .unwrap()
            .call_id("a84b4c76e66710@pc33.atlanta.example.com")
            .cseq(314159)
            .contact("sip:alice@pc33.atlanta.example.com")
            .unwrap()
            .build();

        let wire = request.encode();
        let reparsed = parse_message(&wire).unwrap();
        let reparsed = reparsed.as_request().unwrap();
        assert_eq!(reparsed.method, Method::Invite);
        assert_eq!(reparsed.branch(), Some("z9hG4bK776asdhds"));
        assert_eq!(reparsed.headers.cseq().unwrap().seq, 314159);
        assert_eq!(
            reparsed.headers.from_address().unwrap().tag(),
            Some("1928301774")
        );
        assert_eq!(reparsed.headers.content_length(), Some(0));
    }

    #[test]
    fn test_build_adds_content_length_for_body() {
        let request = RequestBuilder::new(Method::Message, "sip:bob@example.com")
            .unwrap()
            .call_id("m1")
            .cseq(1)
            .body(&b"Watson, come here."[..])
            .build();
        assert_eq!(request.headers.content_length(), Some(18));
    }

    #[test]
    fn test_build_keeps_explicit_content_length() {
        let request = RequestBuilder::options("sip:example.com")
            .unwrap()
            .header(HeaderName::ContentLength, "0")
            .build();
        assert_eq!(
            request
                .headers
                .get_all(&HeaderName::ContentLength)
                .count(),
            1
        );
    }

    #[test]
    fn test_response_builder() {
        let response = ResponseBuilder::new(StatusCode::Ringing)
            .header(HeaderName::CallId, "a84b4c76e66710")
            .build();
        let wire = response.encode();
        let text = String::from_utf8_lossy(&wire);
        assert!(text.starts_with("SIP/2.0 180 Ringing\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }
}
