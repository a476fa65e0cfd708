//! Error taxonomy shared by the HTTP/1 and HTTP/2 halves of the engine.
//!
//! The teacher crate's `ErrorKind` mapped each error to a status code and a
//! log level by hand; this keeps that same per-variant `status_code()`
//! shape but derives `Display`/`Error` via `thiserror` instead of writing it
//! out, and lets `#[from]` absorb `std::io::Error` instead of a manual
//! `From` impl.

use std::fmt;

/// RFC 7540 §11.4 error codes, carried on RST_STREAM/GOAWAY frames and in
/// `CloseReason`/`Http2ConnectionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x0 => Self::NoError,
            0x1 => Self::ProtocolError,
            0x2 => Self::InternalError,
            0x3 => Self::FlowControlError,
            0x4 => Self::SettingsTimeout,
            0x5 => Self::StreamClosed,
            0x6 => Self::FrameSizeError,
            0x7 => Self::RefusedStream,
            0x8 => Self::Cancel,
            0x9 => Self::CompressionError,
            0xa => Self::ConnectError,
            0xb => Self::EnhanceYourCalm,
            0xc => Self::InadequateSecurity,
            0xd => Self::Http11Required,
            // Unknown codes are treated as INTERNAL_ERROR per RFC 7540 §11.4
            // ("unknown or unsupported error codes MUST NOT trigger any
            // special behavior"); we fold them rather than reject the frame.
            _ => Self::InternalError,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoError => "NO_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::FlowControlError => "FLOW_CONTROL_ERROR",
            Self::SettingsTimeout => "SETTINGS_TIMEOUT",
            Self::StreamClosed => "STREAM_CLOSED",
            Self::FrameSizeError => "FRAME_SIZE_ERROR",
            Self::RefusedStream => "REFUSED_STREAM",
            Self::Cancel => "CANCEL",
            Self::CompressionError => "COMPRESSION_ERROR",
            Self::ConnectError => "CONNECT_ERROR",
            Self::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Self::InadequateSecurity => "INADEQUATE_SECURITY",
            Self::Http11Required => "HTTP_1_1_REQUIRED",
        };
        f.write_str(s)
    }
}

/// Whether an `Http2ConnectionError` terminates the whole connection or just
/// the stream that raised it. RFC 7540 lets the same error code apply at
/// either scope depending on what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Connection,
    Stream(u32),
}

/// An HTTP/2-layer error. Escalates to GOAWAY+close (`Connection` scope) or
/// RST_STREAM (`Stream` scope) at the endpoint.
#[derive(Debug, thiserror::Error)]
#[error("http/2 {scope:?} error: {code}{}", message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
pub struct Http2ConnectionError {
    pub code: ErrorCode,
    pub scope: ErrorScope,
    pub message: Option<String>,
}

impl Http2ConnectionError {
    pub fn connection(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, scope: ErrorScope::Connection, message: Some(message.into()) }
    }

    pub fn stream(stream_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, scope: ErrorScope::Stream(stream_id), message: Some(message.into()) }
    }

    pub fn is_connection_scoped(&self) -> bool {
        matches!(self.scope, ErrorScope::Connection)
    }
}

/// Reason a message stream closed, surfaced to `onError`/`onClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Unknown,
    ProtocolError,
    InternalError,
    Cancel,
    Refused,
    EnhanceYourCalm,
    ProtocolDowngrade,
}

impl CloseReason {
    pub fn from_error_code(code: ErrorCode) -> Self {
        match code {
            ErrorCode::NoError => Self::Unknown,
            ErrorCode::ProtocolError => Self::ProtocolError,
            ErrorCode::InternalError => Self::InternalError,
            ErrorCode::Cancel => Self::Cancel,
            ErrorCode::RefusedStream => Self::Refused,
            ErrorCode::EnhanceYourCalm => Self::EnhanceYourCalm,
            ErrorCode::Http11Required => Self::ProtocolDowngrade,
            _ => Self::Unknown,
        }
    }

    pub fn to_error_code(self) -> ErrorCode {
        match self {
            Self::Unknown => ErrorCode::NoError,
            Self::ProtocolError => ErrorCode::ProtocolError,
            Self::InternalError => ErrorCode::InternalError,
            Self::Cancel => ErrorCode::Cancel,
            Self::Refused => ErrorCode::RefusedStream,
            Self::EnhanceYourCalm => ErrorCode::EnhanceYourCalm,
            Self::ProtocolDowngrade => ErrorCode::Http11Required,
        }
    }
}

/// HTTP/1 parse/serialize failures.
///
/// `peer_visible` says whether `message` is safe to echo back in a 400
/// response body (i.e. it doesn't leak anything beyond what the peer itself
/// sent us).
#[derive(Debug, thiserror::Error)]
pub enum Http1Error {
    #[error("header block exceeded {limit} bytes")]
    TooLarge { limit: usize },
    #[error("non-printable byte in {context}")]
    InvalidChars { context: &'static str },
    #[error("malformed start line")]
    BadStartLine,
    #[error("malformed header line (missing ':')")]
    BadHeaderLine,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("data received after chunked body end")]
    DataAfterEnd,
    #[error("body exceeded declared Content-Length")]
    LengthMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Http1Error {
    /// Whether `self`'s `Display` text may be echoed to the peer in a 400
    /// response body without leaking local state.
    pub fn peer_visible(&self) -> bool {
        !matches!(self, Http1Error::Io(_))
    }
}
