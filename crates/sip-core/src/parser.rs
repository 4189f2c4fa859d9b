//! Message-level parsing entry points.
//!
//! The heavy lifting happens in [`crate::scanner`], which finds message
//! boundaries without touching header contents. This module parses the
//! start line once a boundary is known, and offers [`parse_message`]
//! for datagram transports where one packet is one message.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::method::Method;
use crate::scanner::Scanner;
use crate::status::StatusCode;
use crate::uri::Uri;
use crate::version::Version;

/// Longest accepted logical line (start line or header with folds).
pub const MAX_LINE_LENGTH: usize = 8192;
/// Most headers accepted in one message.
pub const MAX_HEADER_COUNT: usize = 128;
/// Largest accepted body.
pub const MAX_BODY_SIZE: u64 = 1024 * 1024;

/// Either kind of start line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StartLine {
    Request {
        method: Method,
        uri: Uri,
        version: Version,
    },
    Status {
        version: Version,
        status: StatusCode,
        reason: String,
    },
}

/// Parses a request line or status line (without its CRLF).
pub(crate) fn parse_start_line(line: &str) -> Result<StartLine> {
    if line.len() >= 4 && line[..4].eq_ignore_ascii_case("sip/") {
        return parse_status_line(line);
    }
    parse_request_line(line)
}

// Request-Line: Method SP Request-URI SP SIP-Version (single spaces).
fn parse_request_line(line: &str) -> Result<StartLine> {
    let mut parts = line.split(' ');
    let method_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidStartLine(line.to_string()))?;
    let uri_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidStartLine(line.to_string()))?;
    let version_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidStartLine(line.to_string()))?;
    if parts.next().is_some() {
        return Err(Error::InvalidStartLine(line.to_string()));
    }

    let method = Method::from_str(method_str)
        .map_err(|_| Error::InvalidStartLine(line.to_string()))?;
    let uri =
        Uri::from_str(uri_str).map_err(|_| Error::InvalidStartLine(line.to_string()))?;
    let version = Version::from_str(version_str)
        .map_err(|_| Error::InvalidStartLine(line.to_string()))?;

    Ok(StartLine::Request {
        method,
        uri,
        version,
    })
}

// Status-Line: SIP-Version SP Status-Code SP Reason-Phrase.
// The reason phrase may contain spaces or be empty.
fn parse_status_line(line: &str) -> Result<StartLine> {
    let mut parts = line.splitn(3, ' ');
    let version_str = parts
        .next()
        .ok_or_else(|| Error::InvalidStartLine(line.to_string()))?;
    let code_str = parts
        .next()
        .ok_or_else(|| Error::InvalidStartLine(line.to_string()))?;
    let reason = parts.next().unwrap_or("").to_string();

    let version = Version::from_str(version_str)
        .map_err(|_| Error::InvalidStartLine(line.to_string()))?;
    let code = code_str
        .parse::<u16>()
        .map_err(|_| Error::InvalidStartLine(line.to_string()))?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| Error::InvalidStartLine(line.to_string()))?;

    Ok(StartLine::Status {
        version,
        status,
        reason,
    })
}

/// Parses one datagram as one complete SIP message.
///
/// Follows RFC 3261 section 18.3 for datagrams: without Content-Length
/// the body runs to the end of the packet; with one, the packet must
/// hold at least that many body bytes and anything past them is
/// ignored.
pub fn parse_message(data: &[u8]) -> Result<Message> {
    let mut scanner = Scanner::new_datagram();
    scanner.push(data);
    match scanner.poll_message()? {
        Some(message) => Ok(message),
        None => Err(Error::Incomplete("truncated datagram")),
    }
}
