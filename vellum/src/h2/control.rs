//! Stream 0: the connection-wide control surface (RFC 7540 §6) —
//! SETTINGS exchange, PING, GOAWAY, and the connection-level flow-control
//! window. Every other stream multiplexed over the same connection shares
//! exactly one of these.

use vellum_core::config::EndpointLimits;
use vellum_core::error::{ErrorCode, Http2ConnectionError};

use crate::frame::{flags, FrameHeader, FrameType};

use super::settings::{SettingId, SettingsValues};
use super::stream_base::FlowWindow;

/// RFC 7540 §6.9.2: the connection-level flow-control window is not
/// affected by SETTINGS_INITIAL_WINDOW_SIZE and always starts at this
/// value until a WINDOW_UPDATE changes it.
const CONNECTION_WINDOW_INITIAL: u32 = 65_535;

pub struct ControlStream {
    pub local: SettingsValues,
    pub peer: SettingsValues,
    pub window: FlowWindow,
    ping_outstanding: Option<[u8; 8]>,
    goaway_sent: bool,
    goaway_received: bool,
}

impl ControlStream {
    pub fn new(limits: &EndpointLimits) -> Self {
        let local = SettingsValues {
            header_table_size: limits.header_table_size,
            enable_push: limits.enable_push,
            max_concurrent_streams: limits.max_concurrent_streams,
            initial_window_size: limits.initial_window_size,
            max_frame_size: limits.max_frame_size,
            max_header_list_size: limits.max_header_list_size,
        };
        Self {
            local,
            peer: SettingsValues::default(),
            window: FlowWindow::new(CONNECTION_WINDOW_INITIAL),
            ping_outstanding: None,
            goaway_sent: false,
            goaway_received: false,
        }
    }

    pub fn build_initial_settings_frame(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.local.encode_diff(&mut payload);
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::Settings, 0, 0, &payload, &mut out);
        out
    }

    pub fn build_settings_ack(&self) -> Vec<u8> {
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::Settings, flags::ACK, 0, &[], &mut out);
        out
    }

    /// Applies a non-ACK SETTINGS payload from the peer. Returns the signed
    /// delta to apply to every currently open stream's send window if
    /// INITIAL_WINDOW_SIZE changed (RFC 7540 §6.9.2).
    pub fn apply_peer_settings(&mut self, payload: &[u8]) -> Result<Option<i64>, Http2ConnectionError> {
        let pairs = SettingsValues::decode_pairs(payload)
            .map_err(|e| Http2ConnectionError::connection(ErrorCode::FrameSizeError, e.to_string()))?;
        let old_initial = self.peer.initial_window_size;
        for (id, value) in pairs {
            let code = if id == SettingId::InitialWindowSize { ErrorCode::FlowControlError } else { ErrorCode::ProtocolError };
            self.peer.apply(id, value).map_err(|e| Http2ConnectionError::connection(code, e.to_string()))?;
        }
        if self.peer.initial_window_size != old_initial {
            Ok(Some(self.peer.initial_window_size as i64 - old_initial as i64))
        } else {
            Ok(None)
        }
    }

    pub fn build_ping(&mut self, payload: [u8; 8]) -> Vec<u8> {
        self.ping_outstanding = Some(payload);
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::Ping, 0, 0, &payload, &mut out);
        out
    }

    pub fn build_ping_ack(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::Ping, flags::ACK, 0, payload, &mut out);
        out
    }

    /// Returns whether `payload` matched the ping we have outstanding,
    /// clearing it either way once acked.
    pub fn handle_ping_ack(&mut self, payload: &[u8]) -> bool {
        let matched = self.ping_outstanding.as_deref() == Some(payload);
        self.ping_outstanding = None;
        matched
    }

    pub fn build_window_update(&mut self, increment: u32) -> Vec<u8> {
        self.window.replenish_recv(increment);
        let mut payload = Vec::new();
        payload.extend_from_slice(&(increment & 0x7fff_ffff).to_be_bytes());
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::WindowUpdate, 0, 0, &payload, &mut out);
        out
    }

    pub fn apply_window_update(&mut self, increment: u32) -> Result<(), Http2ConnectionError> {
        self.window.apply_send_increment(increment, || {
            Http2ConnectionError::connection(ErrorCode::FlowControlError, "connection-level WINDOW_UPDATE overflowed the 31-bit maximum")
        })
    }

    pub fn build_goaway(&mut self, last_stream_id: u32, code: ErrorCode, debug: &[u8]) -> Vec<u8> {
        self.goaway_sent = true;
        let mut payload = Vec::new();
        payload.extend_from_slice(&(last_stream_id & 0x7fff_ffff).to_be_bytes());
        payload.extend_from_slice(&code.as_u32().to_be_bytes());
        payload.extend_from_slice(debug);
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::GoAway, 0, 0, &payload, &mut out);
        out
    }

    pub fn parse_goaway_payload(payload: &[u8]) -> Option<(u32, ErrorCode, &[u8])> {
        if payload.len() < 8 {
            return None;
        }
        let last_stream_id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
        let code = ErrorCode::from_u32(u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]));
        Some((last_stream_id, code, &payload[8..]))
    }

    pub fn note_goaway_received(&mut self) {
        self.goaway_received = true;
    }

    pub fn goaway_sent(&self) -> bool {
        self.goaway_sent
    }

    pub fn goaway_received(&self) -> bool {
        self.goaway_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_settings_frame_omits_rfc_defaults_when_limits_match() {
        let limits = EndpointLimits::new();
        let control = ControlStream::new(&limits);
        let frame = control.build_initial_settings_frame();
        assert_eq!(frame.len(), 9);
    }

    #[test]
    fn applying_peer_initial_window_size_reports_the_delta() {
        let mut control = ControlStream::new(&EndpointLimits::new());
        let mut payload = Vec::new();
        payload.extend_from_slice(&(SettingId::InitialWindowSize as u16).to_be_bytes());
        payload.extend_from_slice(&100u32.to_be_bytes());
        let delta = control.apply_peer_settings(&payload).unwrap();
        assert_eq!(delta, Some(100 - 65_535));
    }

    #[test]
    fn ping_ack_must_match_outstanding_payload() {
        let mut control = ControlStream::new(&EndpointLimits::new());
        control.build_ping(*b"12345678");
        assert!(!control.handle_ping_ack(b"wrongpay"));
        control.build_ping(*b"abcdefgh");
        assert!(control.handle_ping_ack(b"abcdefgh"));
    }

    #[test]
    fn goaway_payload_round_trips() {
        let mut control = ControlStream::new(&EndpointLimits::new());
        let frame = control.build_goaway(41, ErrorCode::EnhanceYourCalm, b"slow down");
        assert!(control.goaway_sent());
        let payload = &frame[9..];
        let (last, code, debug) = ControlStream::parse_goaway_payload(payload).unwrap();
        assert_eq!(last, 41);
        assert_eq!(code, ErrorCode::EnhanceYourCalm);
        assert_eq!(debug, b"slow down");
    }

    #[test]
    fn connection_window_update_overflow_is_rejected() {
        let mut control = ControlStream::new(&EndpointLimits::new());
        assert!(control.apply_window_update(0x7fff_ffff).is_ok());
        assert!(control.apply_window_update(1).is_err());
    }
}
