//! Incremental message boundary scanner.
//!
//! Finds the start line, each logical header line (folds included) and
//! the body extent without parsing any header content. The cursor
//! survives across calls, so bytes are examined once no matter how
//! fragmented the stream arrives. Header values stay raw; the only
//! value read during the scan is Content-Length, which is needed to
//! frame the body.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::header::{is_header_name_char, HeaderName, HeaderSlot, Headers};
use crate::message::{Message, Request, Response};
use crate::parser::{
    parse_start_line, StartLine, MAX_BODY_SIZE, MAX_HEADER_COUNT, MAX_LINE_LENGTH,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// One pushed datagram is one message; a missing Content-Length
    /// means the body runs to the end of the datagram.
    Datagram,
    /// Growing stream; Content-Length is mandatory (RFC 3261 18.3) and
    /// leftover bytes after a message begin the next one.
    Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Skipping keepalive CRLFs before the start line
    Preamble,
    /// Scanning the start line
    StartLine,
    /// Scanning header lines
    Headers,
    /// Headers done; waiting for `message_end` bytes to be buffered
    Body { message_end: usize },
    /// Unrecoverable until the caller discards the bad prefix
    Failed {
        discard: usize,
        reason: &'static str,
    },
}

/// Byte ranges of one committed logical header line.
#[derive(Debug, Clone, Copy)]
struct HeaderLine {
    start: usize,
    name_end: usize,
    value_off: usize,
    end: usize,
}

/// Boundary scanner with cursor state carried across calls.
#[derive(Debug)]
pub struct Scanner {
    buf: BytesMut,
    mode: ScanMode,
    state: ScanState,
    scan_pos: usize,
    line_start: usize,
    /// Set when a header CRLF was seen but the next byte (which decides
    /// fold vs. commit) has not arrived yet.
    pending_line_end: Option<usize>,
    start_line: Option<(usize, usize)>,
    header_lines: Vec<HeaderLine>,
    content_length: Option<u64>,
    body_start: usize,
}

impl Scanner {
    /// Scanner for a stream transport (TCP).
    pub fn new_stream() -> Self {
        Self::new(ScanMode::Stream)
    }

    /// Scanner for one datagram.
    pub fn new_datagram() -> Self {
        Self::new(ScanMode::Datagram)
    }

    fn new(mode: ScanMode) -> Self {
        Scanner {
            buf: BytesMut::new(),
            mode,
            state: ScanState::Preamble,
            scan_pos: 0,
            line_start: 0,
            pending_line_end: None,
            start_line: None,
            header_lines: Vec::new(),
            content_length: None,
            body_start: 0,
        }
    }

    /// Appends newly received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes currently buffered (scanned and unscanned).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Advances the scan as far as the buffered bytes allow.
    ///
    /// `Ok(Some(message))` when a complete message was framed (leftover
    /// bytes stay buffered for the next call); `Ok(None)` when more
    /// bytes are needed; `Err(Error::Preparse { .. })` when the buffer
    /// prefix is unusable. The error repeats until [`discard_failed`]
    /// is called.
    ///
    /// [`discard_failed`]: Scanner::discard_failed
    pub fn poll_message(&mut self) -> Result<Option<Message>> {
        loop {
            match self.state {
                ScanState::Failed { discard, reason } => {
                    return Err(Error::Preparse {
                        offset: discard,
                        reason,
                    });
                }
                ScanState::Preamble => {
                    while self.scan_pos < self.buf.len()
                        && matches!(self.buf[self.scan_pos], b'\r' | b'\n')
                    {
                        self.scan_pos += 1;
                    }
                    if self.scan_pos == self.buf.len() {
                        return Ok(None);
                    }
                    self.line_start = self.scan_pos;
                    self.state = ScanState::StartLine;
                }
                ScanState::StartLine => match self.find_crlf()? {
                    None => return Ok(None),
                    Some(content_end) => {
                        self.check_start_line(content_end)?;
                        self.start_line = Some((self.line_start, content_end));
                        self.line_start = self.scan_pos;
                        self.state = ScanState::Headers;
                    }
                },
                ScanState::Headers => {
                    let content_end = match self.pending_line_end.take() {
                        Some(end) => end,
                        None => match self.find_crlf()? {
                            None => return Ok(None),
                            Some(end) => end,
                        },
                    };

                    if content_end == self.line_start {
                        // Blank line: headers are over.
                        self.finish_headers()?;
                        continue;
                    }

                    if self.scan_pos == self.buf.len() {
                        // Cannot yet tell fold from next header.
                        self.pending_line_end = Some(content_end);
                        return Ok(None);
                    }

                    if matches!(self.buf[self.scan_pos], b' ' | b'\t') {
                        // Folded continuation; the logical line goes on.
                        continue;
                    }

                    self.commit_header_line(self.line_start, content_end)?;
                    self.line_start = self.scan_pos;
                }
                ScanState::Body { message_end } => {
                    if self.buf.len() < message_end {
                        return Ok(None);
                    }
                    return self.take_message(message_end).map(Some);
                }
            }
        }
    }

    /// After a preparse failure, drops the unusable prefix so a stream
    /// can try to resynchronize. Returns how many bytes were dropped.
    pub fn discard_failed(&mut self) -> usize {
        if let ScanState::Failed { discard, .. } = self.state {
            let n = discard.min(self.buf.len());
            self.buf.advance(n);
            self.reset_cursor();
            n
        } else {
            0
        }
    }

    // Scans forward for a CRLF, returning the content end (index of the
    // CR). Lone LF and oversize logical lines are preparse failures.
    fn find_crlf(&mut self) -> Result<Option<usize>> {
        while self.scan_pos < self.buf.len() {
            let b = self.buf[self.scan_pos];
            if b == b'\n' {
                if self.scan_pos == self.line_start || self.buf[self.scan_pos - 1] != b'\r' {
                    let discard = self.scan_pos + 1;
                    return Err(self.fail(discard, "lone LF in message"));
                }
                let content_end = self.scan_pos - 1;
                self.scan_pos += 1;
                return Ok(Some(content_end));
            }
            self.scan_pos += 1;
            if self.scan_pos - self.line_start > MAX_LINE_LENGTH {
                let discard = self.buf.len();
                return Err(self.fail(discard, "line too long"));
            }
        }
        Ok(None)
    }

    // Cheap shape check so obvious non-SIP traffic fails fast, before
    // any header is buffered. Full start line parsing happens when the
    // message is taken.
    fn check_start_line(&mut self, content_end: usize) -> Result<()> {
        let line = &self.buf[self.line_start..content_end];
        let status_shaped = line.len() >= 4 && line[..4].eq_ignore_ascii_case(b"SIP/");
        let request_shaped = line
            .iter()
            .rposition(|&b| b == b' ')
            .map(|sp| {
                let tail = &line[sp + 1..];
                tail.len() >= 4 && tail[..4].eq_ignore_ascii_case(b"SIP/")
            })
            .unwrap_or(false);
        if status_shaped || request_shaped {
            Ok(())
        } else {
            let discard = self.scan_pos;
            Err(self.fail(discard, "malformed start line"))
        }
    }

    fn commit_header_line(&mut self, start: usize, end: usize) -> Result<()> {
        if self.header_lines.len() >= MAX_HEADER_COUNT {
            let discard = self.scan_pos;
            return Err(self.fail(discard, "too many headers"));
        }

        let colon = match self.buf[start..end].iter().position(|&b| b == b':') {
            Some(c) => start + c,
            None => {
                let discard = self.scan_pos;
                return Err(self.fail(discard, "header line without colon"));
            }
        };

        // Whitespace between name and colon is tolerated (RFC 3261 7.3.1).
        let mut name_end = colon;
        while name_end > start && matches!(self.buf[name_end - 1], b' ' | b'\t') {
            name_end -= 1;
        }
        if name_end == start
            || !self.buf[start..name_end].iter().all(|&b| is_header_name_char(b))
        {
            let discard = self.scan_pos;
            return Err(self.fail(discard, "invalid header name"));
        }

        let mut value_off = colon + 1;
        while value_off < end && matches!(self.buf[value_off], b' ' | b'\t') {
            value_off += 1;
        }

        let is_content_length = {
            let name = &self.buf[start..name_end];
            name.eq_ignore_ascii_case(b"content-length") || name.eq_ignore_ascii_case(b"l")
        };
        if is_content_length {
            let value = match self.read_content_length(value_off, end) {
                Some(v) => v,
                None => {
                    let discard = self.scan_pos;
                    return Err(self.fail(discard, "invalid Content-Length"));
                }
            };
            if let Some(existing) = self.content_length {
                if existing != value {
                    let discard = self.scan_pos;
                    return Err(self.fail(discard, "conflicting Content-Length"));
                }
            }
            self.content_length = Some(value);
        }

        self.header_lines.push(HeaderLine {
            start,
            name_end,
            value_off,
            end,
        });
        Ok(())
    }

    // Reads a Content-Length value in place, tolerating folds and
    // padding around the digits but nothing else.
    fn read_content_length(&self, mut off: usize, end: usize) -> Option<u64> {
        let mut value: u64 = 0;
        let mut digits = 0u32;
        let mut done = false;
        while off < end {
            match self.buf[off] {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    if digits > 0 {
                        done = true;
                    }
                }
                b @ b'0'..=b'9' => {
                    if done {
                        return None;
                    }
                    value = value.checked_mul(10)?.checked_add(u64::from(b - b'0'))?;
                    digits += 1;
                }
                _ => return None,
            }
            off += 1;
        }
        if digits == 0 {
            None
        } else {
            Some(value)
        }
    }

    fn finish_headers(&mut self) -> Result<()> {
        self.body_start = self.scan_pos;
        let message_end = match (self.mode, self.content_length) {
            (_, Some(n)) if n > MAX_BODY_SIZE => {
                let discard = self.scan_pos;
                return Err(self.fail(discard, "body too large"));
            }
            (_, Some(n)) => self.body_start + n as usize,
            (ScanMode::Datagram, None) => self.buf.len(),
            (ScanMode::Stream, None) => {
                let discard = self.scan_pos;
                return Err(self.fail(discard, "missing Content-Length on stream"));
            }
        };
        self.state = ScanState::Body { message_end };
        Ok(())
    }

    fn take_message(&mut self, message_end: usize) -> Result<Message> {
        let raw = self.buf.split_to(message_end).freeze();
        let start_line = self.start_line.take();
        let header_lines = std::mem::take(&mut self.header_lines);
        let body_start = self.body_start.min(raw.len());
        self.reset_cursor();

        let (sl_start, sl_end) = start_line
            .ok_or_else(|| Error::Parser("scanner produced message without start line".into()))?;
        build_message(&raw, sl_start, sl_end, &header_lines, body_start)
    }

    fn reset_cursor(&mut self) {
        self.state = ScanState::Preamble;
        self.scan_pos = 0;
        self.line_start = 0;
        self.pending_line_end = None;
        self.start_line = None;
        self.header_lines.clear();
        self.content_length = None;
        self.body_start = 0;
    }

    fn fail(&mut self, discard: usize, reason: &'static str) -> Error {
        self.state = ScanState::Failed { discard, reason };
        Error::Preparse {
            offset: discard,
            reason,
        }
    }
}

// Assembles a Message from the ranges the scan recorded. Header bytes
// are sliced out of the frozen buffer, not copied.
fn build_message(
    raw: &Bytes,
    sl_start: usize,
    sl_end: usize,
    header_lines: &[HeaderLine],
    body_start: usize,
) -> Result<Message> {
    let start_text = std::str::from_utf8(&raw[sl_start..sl_end])
        .map_err(|_| Error::InvalidStartLine("non-UTF-8 start line".to_string()))?;
    let start = parse_start_line(start_text)?;

    let mut headers = Headers::new();
    for line in header_lines {
        let name_text = std::str::from_utf8(&raw[line.start..line.name_end])
            .map_err(|_| Error::Parser("non-ASCII header name".to_string()))?;
        let name: HeaderName = name_text.parse()?;
        headers.push(HeaderSlot::from_raw(
            name,
            raw.slice(line.start..line.end),
            line.value_off - line.start,
        ));
    }

    let body = raw.slice(body_start..);

    Ok(match start {
        StartLine::Request {
            method,
            uri,
            version,
        } => Message::Request(Request {
            method,
            uri,
            version,
            headers,
            body,
        }),
        StartLine::Status {
            version,
            status,
            reason,
        } => Message::Response(Response {
            version,
            status,
            reason: Some(reason),
            headers,
            body,
        }),
    })
}
