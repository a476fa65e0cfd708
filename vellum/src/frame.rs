//! The HTTP/2 frame header (RFC 7540 §4.1): 24-bit length, 8-bit type,
//! 8-bit flags, 31-bit stream id with the reserved top bit masked off on
//! read. Header and payload are always written as one atomic `write` call
//! so concurrent writers (serialized by the embedder via a socket-level
//! mutex, per spec §5) never interleave a frame's header with another
//! frame's payload.

use std::fmt;

use vellum_core::error::ErrorCode;

pub const FRAME_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            _ => return None,
        })
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Data => "DATA",
            Self::Headers => "HEADERS",
            Self::Priority => "PRIORITY",
            Self::RstStream => "RST_STREAM",
            Self::Settings => "SETTINGS",
            Self::PushPromise => "PUSH_PROMISE",
            Self::Ping => "PING",
            Self::GoAway => "GOAWAY",
            Self::WindowUpdate => "WINDOW_UPDATE",
            Self::Continuation => "CONTINUATION",
        };
        f.write_str(s)
    }
}

/// Flag bits used across the frame types that carry flags at all (SETTINGS
/// and PING only use `ACK`; HEADERS uses the rest).
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Bit mask clearing the reserved top bit of a 32-bit stream-id word.
const STREAM_ID_MASK: u32 = 0x7fff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn new(length: u32, frame_type: FrameType, flags: u8, stream_id: u32) -> Self {
        Self { length, frame_type, flags, stream_id: stream_id & STREAM_ID_MASK }
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let len = self.length.to_be_bytes();
        out.extend_from_slice(&len[1..4]);
        out.push(self.frame_type as u8);
        out.push(self.flags);
        out.extend_from_slice(&(self.stream_id & STREAM_ID_MASK).to_be_bytes());
    }

    /// Decodes a 9-byte frame header. The caller has already verified
    /// `buf.len() >= FRAME_HEADER_LEN`. An unrecognized frame type is
    /// reported as `None` in `frame_type` rather than an error — RFC 7540
    /// §4.1 requires unknown frame types to be ignored, not rejected.
    pub fn decode(buf: &[u8]) -> (RawFrameHeader, usize) {
        debug_assert!(buf.len() >= FRAME_HEADER_LEN);
        let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        let type_byte = buf[3];
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & STREAM_ID_MASK;
        (RawFrameHeader { length, type_byte, flags, stream_id }, FRAME_HEADER_LEN)
    }

    /// Writes a complete frame (header + payload) into `out` in one shot.
    pub fn write_frame(frame_type: FrameType, flags: u8, stream_id: u32, payload: &[u8], out: &mut Vec<u8>) {
        let header = FrameHeader::new(payload.len() as u32, frame_type, flags, stream_id);
        out.reserve(FRAME_HEADER_LEN + payload.len());
        header.encode(out);
        out.extend_from_slice(payload);
    }
}

/// The decoded 9-byte header before the frame type has been validated
/// against the known set — `Endpoint::dispatch` needs to distinguish
/// "unknown frame type, ignore" from "known frame type, handle it".
#[derive(Debug, Clone, Copy)]
pub struct RawFrameHeader {
    pub length: u32,
    pub type_byte: u8,
    pub flags: u8,
    pub stream_id: u32,
}

impl RawFrameHeader {
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.type_byte)
    }
}

/// Errors the frame framer itself can raise — purely about frame-header
/// well-formedness, before any stream gets involved. `length_too_large`
/// escalates to `FRAME_SIZE_ERROR` at the endpoint (spec §4.L).
pub fn length_exceeds(length: u32, max_frame_size: u32) -> bool {
    length > max_frame_size
}

pub fn error_code_for_oversized_frame() -> ErrorCode {
    ErrorCode::FrameSizeError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_fields() {
        let mut buf = Vec::new();
        FrameHeader::new(42, FrameType::Headers, flags::END_HEADERS, 7).encode(&mut buf);
        assert_eq!(buf.len(), FRAME_HEADER_LEN);
        let (raw, consumed) = FrameHeader::decode(&buf);
        assert_eq!(consumed, FRAME_HEADER_LEN);
        assert_eq!(raw.length, 42);
        assert_eq!(raw.frame_type(), Some(FrameType::Headers));
        assert_eq!(raw.flags, flags::END_HEADERS);
        assert_eq!(raw.stream_id, 7);
    }

    #[test]
    fn reserved_top_bit_is_masked_on_decode() {
        let mut buf = vec![0, 0, 0, FrameType::Data as u8, 0];
        buf.extend_from_slice(&(0x8000_0005u32).to_be_bytes());
        let (raw, _) = FrameHeader::decode(&buf);
        assert_eq!(raw.stream_id, 5);
    }

    #[test]
    fn write_frame_is_header_then_payload_in_one_buffer() {
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::Ping, flags::ACK, 0, b"12345678", &mut out);
        assert_eq!(out.len(), FRAME_HEADER_LEN + 8);
        let (raw, _) = FrameHeader::decode(&out);
        assert_eq!(raw.length, 8);
        assert_eq!(&out[FRAME_HEADER_LEN..], b"12345678");
    }

    #[test]
    fn unknown_frame_type_decodes_to_none_not_an_error() {
        let mut buf = vec![0, 0, 0, 0xff, 0];
        buf.extend_from_slice(&0u32.to_be_bytes());
        let (raw, _) = FrameHeader::decode(&buf);
        assert_eq!(raw.frame_type(), None);
    }

    #[test]
    fn length_exceeds_checks_against_local_max() {
        assert!(!length_exceeds(16384, 16384));
        assert!(length_exceeds(16385, 16384));
    }
}
