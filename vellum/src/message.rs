//! The shared request/response model both HTTP/1 and HTTP/2 produce and
//! consume (`MessageCommon`, `Request`, `Response`, `MessageData`,
//! `Trailers`).
//!
//! A request and its response reference each other, but neither owns the
//! other — they're built as a pair via [`new_exchange`], held by the
//! caller (stream, connection) as `Rc<RefCell<_>>`, and cross-referenced
//! with `Weak` so there is no reference cycle to leak.
//!
//! Locking is delegated straight to the embedded [`HeaderMap`]: there is
//! no separate message-level lock flag to keep in sync, just
//! `common.lock()` forwarding to `headers.lock()`. Attachments are the one
//! mutation that bypasses the lock, per their role as caller-side
//! metadata threaded alongside an otherwise-frozen message.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::time::Instant;

use bytes::Bytes;

use crate::header::{HeaderMap, Locked};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    Http1_0,
    Http1_1,
    Http2,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2.0",
        })
    }
}

impl FromStr for HttpVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http1_0),
            "HTTP/1.1" => Ok(HttpVersion::Http1_1),
            "HTTP/2.0" | "HTTP/2" => Ok(HttpVersion::Http2),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            _ => Err(()),
        }
    }
}

/// Fields shared by [`Request`] and [`Response`]. Embedded by value, not
/// inherited — there is no common base type, just composition.
pub struct MessageCommon {
    version: HttpVersion,
    chunked: bool,
    headers: HeaderMap,
    created_at: Instant,
    attachment: Option<Box<dyn Any>>,
}

impl MessageCommon {
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            chunked: false,
            headers: HeaderMap::new(),
            created_at: Instant::now(),
            attachment: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.headers.is_locked()
    }

    pub fn lock(&mut self) {
        self.headers.lock();
    }

    fn check_unlocked(&self) -> Result<(), Locked> {
        if self.is_locked() {
            Err(Locked)
        } else {
            Ok(())
        }
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn set_version(&mut self, version: HttpVersion) -> Result<(), Locked> {
        self.check_unlocked()?;
        self.version = version;
        Ok(())
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn set_chunked(&mut self, chunked: bool) -> Result<(), Locked> {
        self.check_unlocked()?;
        self.chunked = chunked;
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Read the attachment if present and of type `T`. Bypasses the lock,
    /// same as every other attachment accessor.
    pub fn attachment<T: 'static>(&self) -> Option<&T> {
        self.attachment.as_ref().and_then(|a| a.downcast_ref())
    }

    pub fn set_attachment<T: 'static>(&mut self, value: T) {
        self.attachment = Some(Box::new(value));
    }

    pub fn take_attachment<T: 'static>(&mut self) -> Option<T> {
        if self.attachment.as_deref().map(|a| a.is::<T>()) == Some(true) {
            self.attachment.take().and_then(|a| a.downcast().ok()).map(|b| *b)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestFieldError {
    #[error("method must be 2-10 uppercase ASCII letters")]
    InvalidMethod,
    #[error("path must start with '/' or be exactly '*'")]
    InvalidPath,
}

pub struct Request {
    common: MessageCommon,
    method: String,
    scheme: Scheme,
    authority: Option<String>,
    path: String,
    paired: Option<Weak<RefCell<Response>>>,
}

impl Request {
    pub fn new(version: HttpVersion, method: impl Into<String>, scheme: Scheme, path: impl Into<String>) -> Result<Self, RequestFieldError> {
        let method = method.into();
        let path = path.into();
        if !crate::validate::method(&method) {
            return Err(RequestFieldError::InvalidMethod);
        }
        if !crate::validate::path(&path) {
            return Err(RequestFieldError::InvalidPath);
        }
        Ok(Self {
            common: MessageCommon::new(version),
            method,
            scheme,
            authority: None,
            path,
            paired: None,
        })
    }

    pub fn common(&self) -> &MessageCommon {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut MessageCommon {
        &mut self.common
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn set_authority(&mut self, authority: Option<String>) -> Result<(), Locked> {
        self.common.check_unlocked()?;
        self.authority = authority;
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn paired_response(&self) -> Option<Rc<RefCell<Response>>> {
        self.paired.as_ref().and_then(Weak::upgrade)
    }
}

pub struct Response {
    common: MessageCommon,
    status: u16,
    paired: Option<Weak<RefCell<Request>>>,
}

impl Response {
    pub fn new(version: HttpVersion, status: u16) -> Self {
        Self { common: MessageCommon::new(version), status, paired: None }
    }

    pub fn common(&self) -> &MessageCommon {
        &self.common
    }

    pub fn common_mut(&mut self) -> &mut MessageCommon {
        &mut self.common
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> Result<(), Locked> {
        self.common.check_unlocked()?;
        self.status = status;
        Ok(())
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    pub fn paired_request(&self) -> Option<Rc<RefCell<Request>>> {
        self.paired.as_ref().and_then(Weak::upgrade)
    }

    /// Whether RFC 7230 §3.3 forbids a body on this response, consulting
    /// the paired request's method where the status alone doesn't decide
    /// it (HEAD, and CONNECT with a 2xx status).
    pub fn is_bodyless(&self) -> bool {
        if self.is_informational() || self.status == 204 || self.status == 304 {
            return true;
        }
        if let Some(req) = self.paired_request() {
            let req = req.borrow();
            if req.method() == "HEAD" {
                return true;
            }
            if req.method() == "CONNECT" && (200..300).contains(&self.status) {
                return true;
            }
        }
        false
    }
}

/// Build a request/response pair, cross-linked by [`Weak`] so dropping
/// either side (once the caller drops its last `Rc`) never leaves the
/// other half artificially alive.
pub fn new_exchange(request: Request, response: Response) -> (Rc<RefCell<Request>>, Rc<RefCell<Response>>) {
    let req = Rc::new(RefCell::new(request));
    let resp = Rc::new(RefCell::new(response));
    req.borrow_mut().paired = Some(Rc::downgrade(&resp));
    resp.borrow_mut().paired = Some(Rc::downgrade(&req));
    (req, resp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("replacement body length {actual} does not match existing length {expected} on a non-chunked message")]
pub struct BodyLengthMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// A body chunk tied to the message it belongs to. `M` is `Request` or
/// `Response` (see the [`RequestData`]/[`ResponseData`] aliases).
pub struct MessageData<M> {
    message: Rc<RefCell<M>>,
    body: Bytes,
    last_packet: bool,
}

impl<M> MessageData<M> {
    pub fn new(message: Rc<RefCell<M>>, body: Bytes, last_packet: bool) -> Self {
        Self { message, body, last_packet }
    }

    pub fn message(&self) -> &Rc<RefCell<M>> {
        &self.message
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn last_packet(&self) -> bool {
        self.last_packet
    }

    /// Replace the body buffer. If `chunked` is false, the replacement
    /// must keep the exact existing length.
    pub fn set_body(&mut self, body: Bytes, chunked: bool) -> Result<(), BodyLengthMismatch> {
        if !chunked && body.len() != self.body.len() {
            return Err(BodyLengthMismatch { expected: self.body.len(), actual: body.len() });
        }
        self.body = body;
        Ok(())
    }
}

pub type RequestData = MessageData<Request>;
pub type ResponseData = MessageData<Response>;

/// A trailing header block, tagged with the message it terminates.
pub struct Trailers<M> {
    owner: Weak<RefCell<M>>,
    headers: HeaderMap,
}

impl<M> Trailers<M> {
    pub fn new(owner: &Rc<RefCell<M>>) -> Self {
        Self { owner: Rc::downgrade(owner), headers: HeaderMap::new() }
    }

    pub fn owner(&self) -> Option<Rc<RefCell<M>>> {
        self.owner.upgrade()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(method: &str, path: &str) -> Request {
        Request::new(HttpVersion::Http1_1, method, Scheme::Https, path).unwrap()
    }

    #[test]
    fn exchange_pairing_is_mutual_and_non_owning() {
        let (req, resp) = new_exchange(req("GET", "/"), Response::new(HttpVersion::Http1_1, 200));
        assert_eq!(resp.borrow().paired_request().unwrap().borrow().method(), "GET");
        assert_eq!(req.borrow().paired_response().unwrap().borrow().status(), 200);

        drop(resp);
        assert!(req.borrow().paired_response().is_none());
    }

    #[test]
    fn locking_common_delegates_to_headers() {
        let mut r = req("GET", "/");
        r.common_mut().headers_mut().set("x", "1").unwrap();
        r.common_mut().lock();
        assert!(r.common().is_locked());
        assert!(r.common_mut().headers_mut().set("x", "2").is_err());
        assert!(r.set_authority(Some("example.com".into())).is_err());
    }

    #[test]
    fn attachment_bypasses_lock() {
        let mut r = req("GET", "/");
        r.common_mut().lock();
        r.common_mut().set_attachment(42u32);
        assert_eq!(r.common().attachment::<u32>(), Some(&42));
    }

    #[test]
    fn invalid_method_and_path_are_rejected() {
        assert!(Request::new(HttpVersion::Http1_1, "get", Scheme::Http, "/").is_err());
        assert!(Request::new(HttpVersion::Http1_1, "GET", Scheme::Http, "no-leading-slash").is_err());
    }

    #[test]
    fn response_body_presence_rules() {
        let (req_handle, resp) = new_exchange(req("HEAD", "/"), Response::new(HttpVersion::Http1_1, 200));
        assert!(resp.borrow().is_bodyless());
        drop(req_handle);

        let (_connect_req, connect_resp) = new_exchange(req("CONNECT", "/"), Response::new(HttpVersion::Http1_1, 200));
        assert!(connect_resp.borrow().is_bodyless());

        let (_get_req, ok_resp) = new_exchange(req("GET", "/"), Response::new(HttpVersion::Http1_1, 200));
        assert!(!ok_resp.borrow().is_bodyless());

        assert!(Response::new(HttpVersion::Http1_1, 204).is_bodyless());
        assert!(Response::new(HttpVersion::Http1_1, 304).is_bodyless());
        assert!(Response::new(HttpVersion::Http1_1, 100).is_bodyless());
    }

    #[test]
    fn message_data_rejects_length_change_unless_chunked() {
        let r = Rc::new(RefCell::new(req("GET", "/")));
        let mut data = MessageData::new(r, Bytes::from_static(b"hello"), false);
        assert!(data.set_body(Bytes::from_static(b"hello!"), false).is_err());
        assert!(data.set_body(Bytes::from_static(b"world"), false).is_ok());
        assert!(data.set_body(Bytes::from_static(b"grew a lot"), true).is_ok());
    }
}
