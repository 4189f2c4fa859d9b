//! Transaction matching keys, RFC 3261 section 17.2.3.
//!
//! Messages from a compliant peer carry the magic cookie in the top Via
//! branch and match on (branch, method, direction). Messages from an
//! RFC 2543 peer fall back to the legacy tuple of Call-ID, From tag,
//! CSeq and top Via sent-by.

use std::fmt;

use ringline_sip_core::{Method, Request, Response};

use crate::error::{Error, Result};

/// Branch parameters injected by RFC 3261 elements start with this.
pub const MAGIC_COOKIE: &str = "z9hG4bK";

/// Identity of one transaction in the engine's table.
///
/// The method stored for a server-side ACK is `Invite`, so the ACK
/// lands on the INVITE server transaction it acknowledges. A CANCEL
/// keeps its own method and therefore its own transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionKey {
    /// RFC 3261 matching: the branch is globally unique by contract.
    Branch {
        branch: String,
        method: Method,
        is_server: bool,
    },
    /// RFC 2543 fallback for peers that do not send the magic cookie.
    Legacy {
        call_id: String,
        from_tag: String,
        cseq: u32,
        sent_by: String,
        method: Method,
        is_server: bool,
    },
}

impl TransactionKey {
    /// Key for an incoming request, as the server side sees it.
    pub fn from_request(request: &Request) -> Result<Self> {
        Self::derive_from_request(request, true)
    }

    /// Key for a request this side is about to send.
    pub fn for_client_request(request: &Request) -> Result<Self> {
        Self::derive_from_request(request, false)
    }

    /// Key for an incoming response, matched against client
    /// transactions. The method comes from CSeq because responses to
    /// different methods can share a dialog's Call-ID.
    pub fn from_response(response: &Response) -> Result<Self> {
        let cseq = response
            .headers
            .cseq()
            .ok_or(Error::MissingHeader("CSeq"))?;
        let method = cseq.method.clone();
        let seq = cseq.seq;

        if let Some(branch) = cookie_branch(response.headers.top_via_branch()) {
            return Ok(TransactionKey::Branch {
                branch: branch.to_string(),
                method,
                is_server: false,
            });
        }

        Self::legacy(&response.headers, seq, method, false)
    }

    fn derive_from_request(request: &Request, is_server: bool) -> Result<Self> {
        // ACK shares the INVITE's branch and must land on the INVITE
        // server transaction. CANCEL shares the branch too but forms
        // its own transaction, so its method stays CANCEL.
        let method = if is_server && request.method == Method::Ack {
            Method::Invite
        } else {
            request.method.clone()
        };

        if let Some(branch) = cookie_branch(request.headers.top_via_branch()) {
            return Ok(TransactionKey::Branch {
                branch: branch.to_string(),
                method,
                is_server,
            });
        }

        let cseq = request
            .headers
            .cseq()
            .ok_or(Error::MissingHeader("CSeq"))?;
        Self::legacy(&request.headers, cseq.seq, method, is_server)
    }

    fn legacy(
        headers: &ringline_sip_core::Headers,
        cseq: u32,
        method: Method,
        is_server: bool,
    ) -> Result<Self> {
        let call_id = headers.call_id().ok_or(Error::MissingHeader("Call-ID"))?;
        let from_tag = headers
            .from_address()
            .and_then(|from| from.tag())
            .unwrap_or("")
            .to_string();
        let via = headers.top_via().ok_or(Error::MissingHeader("Via"))?;
        let sent_by = match via.port {
            Some(port) => format!("{}:{}", via.host, port),
            None => via.host.clone(),
        };
        Ok(TransactionKey::Legacy {
            call_id: call_id.0.clone(),
            from_tag,
            cseq,
            sent_by,
            method,
            is_server,
        })
    }

    pub fn method(&self) -> &Method {
        match self {
            TransactionKey::Branch { method, .. } => method,
            TransactionKey::Legacy { method, .. } => method,
        }
    }

    pub fn is_server(&self) -> bool {
        match self {
            TransactionKey::Branch { is_server, .. } => *is_server,
            TransactionKey::Legacy { is_server, .. } => *is_server,
        }
    }

    /// Same key under a different method. Used to find the INVITE
    /// server transaction a CANCEL is aimed at.
    pub fn with_method(&self, method: Method) -> Self {
        let mut key = self.clone();
        match &mut key {
            TransactionKey::Branch { method: m, .. } => *m = method,
            TransactionKey::Legacy { method: m, .. } => *m = method,
        }
        key
    }
}

fn cookie_branch(branch: Option<&str>) -> Option<&str> {
    match branch {
        Some(b) if b.starts_with(MAGIC_COOKIE) && b.len() > MAGIC_COOKIE.len() => Some(b),
        _ => None,
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_server() { "server" } else { "client" };
        match self {
            TransactionKey::Branch { branch, method, .. } => {
                write!(f, "{}:{}:{}", branch, method, side)
            }
            TransactionKey::Legacy {
                call_id,
                from_tag,
                cseq,
                method,
                ..
            } => {
                write!(f, "legacy:{}:{}:{}:{}:{}", call_id, from_tag, cseq, method, side)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use ringline_sip_core::{RequestBuilder, ResponseBuilder, StatusCode};

    fn invite(branch: Option<&str>) -> Request {
        RequestBuilder::invite("sip:bob@biloxi.example.com")
            .unwrap()
            .via("UDP", "client.atlanta.example.com:5060", branch)
            .from("Alice", "sip:alice@atlanta.example.com", Some("88sja8x"))
            .unwrap()
            .to("Bob", "sip:bob@biloxi.example.com", None)
            .unwrap()
            .call_id("3848276298220188511@atlanta.example.com")
            .cseq(1)
            .build()
    }

    #[test]
    fn test_cookie_branch_yields_branch_key() {
        let request = invite(Some("z9hG4bK74bf9"));
        let key = TransactionKey::from_request(&request).unwrap();
        assert_eq!(
            key,
            TransactionKey::Branch {
                branch: "z9hG4bK74bf9".to_string(),
                method: Method::Invite,
                is_server: true,
            }
        );
    }

    #[test]
    fn test_missing_cookie_falls_back_to_legacy() {
        let request = invite(Some("1234abcd"));
        let key = TransactionKey::from_request(&request).unwrap();
        match key {
            TransactionKey::Legacy {
                call_id,
                from_tag,
                cseq,
                sent_by,
                method,
                is_server,
            } => {
                assert_eq!(call_id, "3848276298220188511@atlanta.example.com");
                assert_eq!(from_tag, "88sja8x");
                assert_eq!(cseq, 1);
                assert_eq!(sent_by, "client.atlanta.example.com:5060");
                assert_eq!(method, Method::Invite);
                assert!(is_server);
            }
            other => panic!("expected legacy key, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_cookie_is_not_a_valid_branch() {
        // A branch that is exactly the cookie carries no entropy.
        let request = invite(Some(MAGIC_COOKIE));
        let key = TransactionKey::from_request(&request).unwrap();
        assert!(matches!(key, TransactionKey::Legacy { .. }));
    }

    #[test]
    fn test_ack_maps_to_invite_server_key() {
        let mut request = invite(Some("z9hG4bK74bf9"));
        request.method = Method::Ack;
        let key = TransactionKey::from_request(&request).unwrap();
        assert_eq!(*key.method(), Method::Invite);

        let invite_key = TransactionKey::from_request(&invite(Some("z9hG4bK74bf9"))).unwrap();
        assert_eq!(key, invite_key);
    }

    #[test]
    fn test_cancel_keeps_its_own_method() {
        let mut request = invite(Some("z9hG4bK74bf9"));
        request.method = Method::Cancel;
        let key = TransactionKey::from_request(&request).unwrap();
        assert_eq!(*key.method(), Method::Cancel);
        assert_ne!(
            key,
            TransactionKey::from_request(&invite(Some("z9hG4bK74bf9"))).unwrap()
        );
        assert_eq!(
            key.with_method(Method::Invite),
            TransactionKey::from_request(&invite(Some("z9hG4bK74bf9"))).unwrap()
        );
    }

    #[test]
    fn test_response_key_matches_client_request_key() {
        let request = invite(Some("z9hG4bK74bf9"));
        let request_key = TransactionKey::for_client_request(&request).unwrap();

        let response = ResponseBuilder::new(StatusCode::Ringing)
            .header(ringline_sip_core::HeaderName::Via, "SIP/2.0/UDP client.atlanta.example.com:5060;branch=z9hG4bK74bf9")
            .header(ringline_sip_core::HeaderName::From, "\"Alice\" <sip:alice@atlanta.example.com>;tag=88sja8x")
            .header(ringline_sip_core::HeaderName::To, "\"Bob\" <sip:bob@biloxi.example.com>;tag=314159")
            .header(ringline_sip_core::HeaderName::CallId, "3848276298220188511@atlanta.example.com")
            .header(ringline_sip_core::HeaderName::CSeq, "1 INVITE")
            .build();
        let response_key = TransactionKey::from_response(&response).unwrap();
        assert_eq!(request_key, response_key);
    }

    #[test]
    fn test_client_and_server_keys_differ() {
        let request = invite(Some("z9hG4bK74bf9"));
        let server = TransactionKey::from_request(&request).unwrap();
        let client = TransactionKey::for_client_request(&request).unwrap();
        assert_ne!(server, client);

        let mut set = HashSet::new();
        set.insert(server.clone());
        set.insert(client.clone());
        assert_eq!(set.len(), 2);
        assert!(set.contains(&server));
    }

    #[test]
    fn test_display_is_compact() {
        let request = invite(Some("z9hG4bK74bf9"));
        let key = TransactionKey::from_request(&request).unwrap();
        assert_eq!(key.to_string(), "z9hG4bK74bf9:INVITE:server");
    }
}
