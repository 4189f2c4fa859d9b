//! Helpers for the messages the transaction layer builds itself: the
//! automatic 100 Trying, the ACK for non-2xx finals, and the branch and
//! tag identifiers TUs need when composing requests.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use uuid::Uuid;

use ringline_sip_core::{
    CSeq, HeaderName, HeaderSlot, Method, Request, Response, StatusCode, TypedHeader,
};

use crate::error::{Error, Result};
use crate::transaction::MAGIC_COOKIE;

/// Generates a Via branch parameter carrying the RFC 3261 magic cookie.
pub fn generate_branch() -> String {
    format!("{}-{}", MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// Generates a random tag for From and To headers.
pub fn generate_tag() -> String {
    let mut rng = thread_rng();
    (0..8).map(|_| rng.sample(Alphanumeric) as char).collect()
}

/// Builds a response to `request` with the headers RFC 3261 section
/// 8.2.6.2 copies from the request: every Via in order, then From, To,
/// Call-ID and CSeq. The copies reuse the received bytes, so they
/// encode exactly as they arrived.
pub fn create_response(request: &Request, status: StatusCode) -> Response {
    let mut response = Response::new(status);
    for name in [
        HeaderName::Via,
        HeaderName::From,
        HeaderName::To,
        HeaderName::CallId,
        HeaderName::CSeq,
    ] {
        for slot in request.headers.get_all(&name) {
            response.headers.push(slot.clone());
        }
    }
    response.headers.push(HeaderSlot::from_typed(
        HeaderName::ContentLength,
        TypedHeader::ContentLength(0),
    ));
    response
}

/// The 100 Trying the engine sends on new INVITE server transactions.
pub fn create_trying_response(request: &Request) -> Response {
    create_response(request, StatusCode::Trying)
}

/// A bare 200 OK answering `request`.
pub fn create_ok_response(request: &Request) -> Response {
    create_response(request, StatusCode::Ok)
}

/// A 200 OK whose To header gains a fresh tag when it has none. For
/// TUs answering a dialog-forming request.
pub fn create_ok_response_with_tag(request: &Request) -> Response {
    let mut response = create_response(request, StatusCode::Ok);
    if let Some(slot) = response.headers.get_mut(&HeaderName::To) {
        if let Ok(TypedHeader::To(address)) = slot.typed_mut() {
            if address.tag().is_none() {
                address.set_tag(generate_tag());
            }
        }
    }
    response
}

/// Builds the ACK for a non-2xx final response per RFC 3261 section
/// 17.1.1.3: Request-URI, top Via, From, Call-ID and the CSeq number
/// come from the INVITE, To comes from the response so its tag
/// survives, and any Route set is carried along.
pub fn create_ack(invite: &Request, response: &Response) -> Result<Request> {
    let mut ack = Request::new(Method::Ack, invite.uri.clone());

    let via = invite
        .headers
        .top_via()
        .ok_or(Error::MissingHeader("Via"))?
        .clone();
    ack.headers
        .push(HeaderSlot::from_typed(HeaderName::Via, TypedHeader::Via(vec![via])));

    let from = invite
        .headers
        .from_address()
        .ok_or(Error::MissingHeader("From"))?
        .clone();
    ack.headers
        .push(HeaderSlot::from_typed(HeaderName::From, TypedHeader::From(from)));

    let to = response
        .headers
        .to_address()
        .ok_or(Error::MissingHeader("To"))?
        .clone();
    ack.headers
        .push(HeaderSlot::from_typed(HeaderName::To, TypedHeader::To(to)));

    let call_id = invite
        .headers
        .call_id()
        .ok_or(Error::MissingHeader("Call-ID"))?
        .clone();
    ack.headers.push(HeaderSlot::from_typed(
        HeaderName::CallId,
        TypedHeader::CallId(call_id),
    ));

    let cseq = invite.headers.cseq().ok_or(Error::MissingHeader("CSeq"))?;
    ack.headers.push(HeaderSlot::from_typed(
        HeaderName::CSeq,
        TypedHeader::CSeq(CSeq::new(cseq.seq, Method::Ack)),
    ));

    if let Some(max_forwards) = invite.headers.max_forwards() {
        ack.headers.push(HeaderSlot::from_typed(
            HeaderName::MaxForwards,
            TypedHeader::MaxForwards(max_forwards),
        ));
    }

    for slot in invite.headers.get_all(&HeaderName::Route) {
        ack.headers.push(slot.clone());
    }

    ack.headers.push(HeaderSlot::from_typed(
        HeaderName::ContentLength,
        TypedHeader::ContentLength(0),
    ));
    Ok(ack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringline_sip_core::RequestBuilder;

    fn invite() -> Request {
        RequestBuilder::invite("sip:bob@biloxi.example.com")
            .unwrap()
            .via("UDP", "atlanta.example.com:5060", Some("z9hG4bK74bf9"))
            .max_forwards(70)
            .from("Alice", "sip:alice@atlanta.example.com", Some("9fxced76sl"))
            .unwrap()
            .to("Bob", "sip:bob@biloxi.example.com", None)
            .unwrap()
            .call_id("3848276298220188511@atlanta.example.com")
            .cseq(1)
            .build()
    }

    #[test]
    fn test_generate_branch_carries_cookie() {
        let a = generate_branch();
        let b = generate_branch();
        assert!(a.starts_with(MAGIC_COOKIE));
        assert!(a.len() > MAGIC_COOKIE.len());
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_tag_shape() {
        let tag = generate_tag();
        assert_eq!(tag.len(), 8);
        assert!(tag.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_create_response_copies_request_identity() {
        let request = invite();
        let response = create_response(&request, StatusCode::Ringing);

        let text = String::from_utf8_lossy(&response.encode()).to_string();
        assert!(text.starts_with("SIP/2.0 180 Ringing\r\n"));
        assert!(text.contains("branch=z9hG4bK74bf9"));
        assert!(text.contains("tag=9fxced76sl"));
        assert!(text.contains("Call-ID: 3848276298220188511@atlanta.example.com\r\n"));
        assert!(text.contains("CSeq: 1 INVITE\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn test_ok_response_with_tag_adds_to_tag() {
        let request = invite();
        let response = create_ok_response_with_tag(&request);
        let to = response.headers.to_address().unwrap();
        assert!(to.tag().is_some());

        // An existing tag is left alone.
        let tagged = RequestBuilder::bye("sip:bob@biloxi.example.com")
            .unwrap()
            .via("UDP", "atlanta.example.com:5060", Some("z9hG4bKabc"))
            .from("Alice", "sip:alice@atlanta.example.com", Some("9fxced76sl"))
            .unwrap()
            .to("Bob", "sip:bob@biloxi.example.com", Some("314159"))
            .unwrap()
            .call_id("x@y")
            .cseq(2)
            .build();
        let response = create_ok_response_with_tag(&tagged);
        assert_eq!(response.headers.to_address().unwrap().tag(), Some("314159"));
    }

    #[test]
    fn test_create_ack_follows_response_to_tag() {
        let request = invite();
        let mut response = create_response(&request, StatusCode::BusyHere);
        if let Some(slot) = response.headers.get_mut(&HeaderName::To) {
            if let Ok(TypedHeader::To(address)) = slot.typed_mut() {
                address.set_tag("b-tag-1");
            }
        }

        let ack = create_ack(&request, &response).unwrap();
        assert_eq!(ack.method, Method::Ack);
        assert_eq!(ack.uri, request.uri);
        assert_eq!(ack.headers.to_address().unwrap().tag(), Some("b-tag-1"));
        assert_eq!(ack.headers.cseq().unwrap().seq, 1);
        assert_eq!(ack.headers.cseq().unwrap().method, Method::Ack);
        assert_eq!(
            ack.headers.top_via_branch(),
            Some("z9hG4bK74bf9"),
            "ACK reuses the INVITE branch"
        );

        let text = String::from_utf8_lossy(&ack.encode()).to_string();
        assert!(text.starts_with("ACK sip:bob@biloxi.example.com SIP/2.0\r\n"));
        assert!(text.contains("CSeq: 1 ACK\r\n"));
    }

    #[test]
    fn test_create_ack_requires_identity_headers() {
        let mut request = invite();
        request.headers.remove(&HeaderName::CallId);
        let response = create_response(&request, StatusCode::BusyHere);
        assert!(matches!(
            create_ack(&request, &response),
            Err(Error::MissingHeader("Call-ID"))
        ));
    }
}
