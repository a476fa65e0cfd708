//! Incremental HTTP/1 request/response header parsing.
//!
//! [`RequestReceiver`] and [`ResponseReceiver`] are fed successive byte
//! slices (as they arrive off the wire) and report [`ReceiveOutcome`]
//! each call: `Incomplete` until the blank line ending the header block
//! has been seen, then `Complete` with the offset inside *that* call's
//! slice where the body begins. A line that straddles two calls is
//! carried in an internal spillover buffer; a bare CR at the end of one
//! call paired with a bare LF starting the next still counts as one
//! CRLF.

use vellum_core::Http1Error;

use crate::header::HeaderMap;
use crate::message::{HttpVersion, Request, Response, Scheme};
use crate::validate;

const DEFAULT_MAX_HEADER_BYTES: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Incomplete,
    Complete { body_offset: usize },
}

pub trait Http1Receiver {
    fn receive(&mut self, buf: &[u8]) -> Result<ReceiveOutcome, Http1Error>;
}

/// Locates the next CRLF (or bare LF)-terminated line, splicing in any
/// spillover from a previous call. Returns `(line_without_terminator,
/// bytes_of_buf_consumed)`, or `None` if `buf` ran out first (in which
/// case its unconsumed tail has been copied into `spillover`).
fn next_line(spillover: &mut Vec<u8>, buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    if !spillover.is_empty() && spillover.last() == Some(&b'\r') && buf.first() == Some(&b'\n') {
        let mut line = std::mem::take(spillover);
        line.pop();
        return Some((line, 1));
    }

    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            let line_end = if i > 0 && buf[i - 1] == b'\r' { i - 1 } else { i };
            let mut line = std::mem::take(spillover);
            line.extend_from_slice(&buf[..line_end]);
            return Some((line, i + 1));
        }
        i += 1;
    }

    spillover.extend_from_slice(buf);
    None
}

struct Core {
    spillover: Vec<u8>,
    header_size: usize,
    max_header_bytes: usize,
    start_line_seen: bool,
    headers: HeaderMap,
}

impl Core {
    fn new(max_header_bytes: usize) -> Self {
        Self {
            spillover: Vec::new(),
            header_size: 0,
            max_header_bytes,
            start_line_seen: false,
            headers: HeaderMap::new(),
        }
    }

    fn add_header_line(&mut self, line: &[u8]) -> Result<(), Http1Error> {
        if !validate::header_line_chars(line) {
            return Err(Http1Error::InvalidChars { context: "header line" });
        }
        let colon = line.iter().position(|&b| b == b':').ok_or(Http1Error::BadHeaderLine)?;
        let name = std::str::from_utf8(&line[..colon]).map_err(|_| Http1Error::BadHeaderLine)?;
        let value = std::str::from_utf8(&line[colon + 1..]).map_err(|_| Http1Error::BadHeaderLine)?.trim();
        self.headers.add(name, value).expect("fresh HeaderMap is never locked");
        Ok(())
    }
}

fn apply_chunked_flag(request_headers: &HeaderMap) -> bool {
    request_headers.get_first("transfer-encoding").map(|v| v.eq_ignore_ascii_case("chunked")).unwrap_or(false)
}

enum RequestTarget {
    Asterisk,
    Origin(String),
    Absolute { authority: String, path: String },
}

fn parse_target(raw: &str) -> Result<RequestTarget, Http1Error> {
    if raw == "*" {
        return Ok(RequestTarget::Asterisk);
    }
    if raw.starts_with('/') {
        return Ok(RequestTarget::Origin(raw.to_string()));
    }
    for prefix in ["http://", "https://"] {
        if let Some(rest) = raw.strip_prefix(prefix) {
            let slash = rest.find('/').ok_or(Http1Error::BadStartLine)?;
            return Ok(RequestTarget::Absolute { authority: rest[..slash].to_string(), path: rest[slash..].to_string() });
        }
    }
    Err(Http1Error::BadStartLine)
}

struct PendingRequestStart {
    method: String,
    target: RequestTarget,
    version: HttpVersion,
}

pub struct RequestReceiver {
    core: Core,
    scheme: Scheme,
    pending: Option<PendingRequestStart>,
    request: Option<Request>,
}

impl RequestReceiver {
    pub fn new(scheme: Scheme) -> Self {
        Self::with_max_header_bytes(scheme, DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn with_max_header_bytes(scheme: Scheme, max_header_bytes: usize) -> Self {
        Self { core: Core::new(max_header_bytes), scheme, pending: None, request: None }
    }

    /// Takes the fully-assembled request after `receive` returns
    /// `Complete`. Returns `None` if called before completion or twice.
    pub fn take_request(&mut self) -> Option<Request> {
        self.request.take()
    }

    fn parse_start_line(&mut self, line: &[u8]) -> Result<(), Http1Error> {
        let text = std::str::from_utf8(line).map_err(|_| Http1Error::BadStartLine)?;
        let fields: Vec<&str> = text.split(' ').filter(|f| !f.is_empty()).collect();
        let [method, target, version] = fields[..] else {
            return Err(Http1Error::BadStartLine);
        };
        if !fields.iter().all(|f| f.bytes().all(|b| (33..=126).contains(&b))) {
            return Err(Http1Error::InvalidChars { context: "request start line" });
        }
        let version = version.parse().map_err(|_| Http1Error::BadStartLine)?;
        self.pending = Some(PendingRequestStart { method: method.to_string(), target: parse_target(target)?, version });
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Http1Error> {
        let pending = self.pending.take().ok_or(Http1Error::BadStartLine)?;
        let (path, absolute_authority) = match pending.target {
            RequestTarget::Asterisk => ("*".to_string(), None),
            RequestTarget::Origin(p) => (p, None),
            RequestTarget::Absolute { authority, path } => (path, Some(authority)),
        };
        let mut request = Request::new(pending.version, pending.method, self.scheme, path).map_err(|_| Http1Error::BadStartLine)?;
        let authority = absolute_authority.or_else(|| self.core.headers.get_first("host").map(str::to_string));
        request.set_authority(authority).expect("freshly built request is never locked");
        let chunked = apply_chunked_flag(&self.core.headers);
        *request.common_mut().headers_mut() = std::mem::take(&mut self.core.headers);
        request.common_mut().set_chunked(chunked).expect("freshly built request is never locked");
        self.request = Some(request);
        Ok(())
    }
}

impl Http1Receiver for RequestReceiver {
    fn receive(&mut self, buf: &[u8]) -> Result<ReceiveOutcome, Http1Error> {
        let mut offset = 0;
        loop {
            let Some((line, consumed)) = next_line(&mut self.core.spillover, &buf[offset..]) else {
                return Ok(ReceiveOutcome::Incomplete);
            };
            offset += consumed;
            self.core.header_size += line.len() + 2;
            if self.core.header_size > self.core.max_header_bytes {
                return Err(Http1Error::TooLarge { limit: self.core.max_header_bytes });
            }

            if !self.core.start_line_seen {
                self.core.start_line_seen = true;
                self.parse_start_line(&line)?;
                continue;
            }

            if line.is_empty() {
                self.finalize()?;
                return Ok(ReceiveOutcome::Complete { body_offset: offset });
            }

            self.core.add_header_line(&line)?;
        }
    }
}

struct PendingResponseStart {
    version: HttpVersion,
    status: u16,
}

pub struct ResponseReceiver {
    core: Core,
    pending: Option<PendingResponseStart>,
    response: Option<Response>,
}

impl ResponseReceiver {
    pub fn new() -> Self {
        Self::with_max_header_bytes(DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn with_max_header_bytes(max_header_bytes: usize) -> Self {
        Self { core: Core::new(max_header_bytes), pending: None, response: None }
    }

    pub fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    fn parse_start_line(&mut self, line: &[u8]) -> Result<(), Http1Error> {
        let text = std::str::from_utf8(line).map_err(|_| Http1Error::BadStartLine)?;
        let mut fields = text.splitn(3, ' ');
        let version = fields.next().ok_or(Http1Error::BadStartLine)?;
        let status = fields.next().ok_or(Http1Error::BadStartLine)?;
        let version = version.parse().map_err(|_| Http1Error::BadStartLine)?;
        let status = validate::status_token(status).ok_or(Http1Error::BadStartLine)?;
        self.pending = Some(PendingResponseStart { version, status });
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), Http1Error> {
        let pending = self.pending.take().ok_or(Http1Error::BadStartLine)?;
        let mut response = Response::new(pending.version, pending.status);
        let chunked = apply_chunked_flag(&self.core.headers);
        *response.common_mut().headers_mut() = std::mem::take(&mut self.core.headers);
        response.common_mut().set_chunked(chunked).expect("freshly built response is never locked");
        self.response = Some(response);
        Ok(())
    }
}

impl Default for ResponseReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Http1Receiver for ResponseReceiver {
    fn receive(&mut self, buf: &[u8]) -> Result<ReceiveOutcome, Http1Error> {
        let mut offset = 0;
        loop {
            let Some((line, consumed)) = next_line(&mut self.core.spillover, &buf[offset..]) else {
                return Ok(ReceiveOutcome::Incomplete);
            };
            offset += consumed;
            self.core.header_size += line.len() + 2;
            if self.core.header_size > self.core.max_header_bytes {
                return Err(Http1Error::TooLarge { limit: self.core.max_header_bytes });
            }

            if !self.core.start_line_seen {
                self.core.start_line_seen = true;
                self.parse_start_line(&line)?;
                continue;
            }

            if line.is_empty() {
                self.finalize()?;
                return Ok(ReceiveOutcome::Complete { body_offset: offset });
            }

            self.core.add_header_line(&line)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_call_parses_request_and_body_offset() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        let buf = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";
        let outcome = recv.receive(buf).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Complete { body_offset: buf.len() });
        let req = recv.take_request().unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.authority(), Some("x"));
        assert_eq!(req.path(), "/a");
        assert_eq!(req.common().version(), HttpVersion::Http1_1);
    }

    #[test]
    fn split_feed_across_two_calls() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        assert_eq!(recv.receive(b"GET /a HTTP/1.1\r\nHos").unwrap(), ReceiveOutcome::Incomplete);
        let second = b"t: x\r\n\r\nBODY";
        let outcome = recv.receive(second).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Complete { body_offset: 8 });
        assert_eq!(&second[8..], b"BODY");
        let req = recv.take_request().unwrap();
        assert_eq!(req.authority(), Some("x"));
    }

    #[test]
    fn bare_cr_lf_split_across_calls_is_one_terminator() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        assert_eq!(recv.receive(b"GET / HTTP/1.1\r").unwrap(), ReceiveOutcome::Incomplete);
        assert_eq!(recv.receive(b"\n\r\n").unwrap(), ReceiveOutcome::Complete { body_offset: 3 });
    }

    #[test]
    fn absolute_uri_authority_overrides_host() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        let buf = b"GET http://real.example/path HTTP/1.1\r\nHost: decoy\r\n\r\n";
        recv.receive(buf).unwrap();
        let req = recv.take_request().unwrap();
        assert_eq!(req.authority(), Some("real.example"));
        assert_eq!(req.path(), "/path");
    }

    #[test]
    fn oversized_header_block_fails_too_large() {
        let mut recv = RequestReceiver::with_max_header_bytes(Scheme::Http, 16);
        let buf = b"GET / HTTP/1.1\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaa\r\n\r\n";
        assert!(matches!(recv.receive(buf), Err(Http1Error::TooLarge { .. })));
    }

    #[test]
    fn chunked_transfer_encoding_sets_flag() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        let buf = b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        recv.receive(buf).unwrap();
        let req = recv.take_request().unwrap();
        assert!(req.common().is_chunked());
    }

    #[test]
    fn response_start_line_ignores_reason_phrase() {
        let mut recv = ResponseReceiver::new();
        let buf = b"HTTP/1.1 404 Not Found\r\n\r\n";
        recv.receive(buf).unwrap();
        let resp = recv.take_response().unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(resp.common().version(), HttpVersion::Http1_1);
    }

    #[test]
    fn asterisk_request_target_is_accepted() {
        let mut recv = RequestReceiver::new(Scheme::Http);
        let buf = b"OPTIONS * HTTP/1.1\r\n\r\n";
        recv.receive(buf).unwrap();
        assert_eq!(recv.take_request().unwrap().path(), "*");
    }
}
