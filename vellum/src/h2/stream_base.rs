//! Per-stream (and, reused at stream id 0, per-connection) flow-control
//! bookkeeping shared by [`super::control::ControlStream`] and
//! [`super::message_stream::MessageStream`] (RFC 7540 §6.9).
//!
//! `send` is credit we may spend sending DATA to the peer; it is seeded
//! from the peer's advertised `INITIAL_WINDOW_SIZE` and can go negative
//! when a mid-stream SETTINGS change shrinks it out from under
//! already-counted bytes. `recv` is credit we've advertised to the peer for
//! sending DATA to us; it only ever shrinks on receipt and grows again when
//! we emit a WINDOW_UPDATE.

use vellum_core::error::{ErrorCode, Http2ConnectionError};

/// RFC 7540 §6.9.1: a flow-control window must never exceed 2^31 - 1.
pub const MAX_WINDOW_SIZE: i64 = 0x7fff_ffff;

#[derive(Debug, Clone, Copy)]
pub struct FlowWindow {
    send: i64,
    recv: i64,
}

impl FlowWindow {
    pub fn new(initial: u32) -> Self {
        Self { send: initial as i64, recv: initial as i64 }
    }

    pub fn send_available(&self) -> i64 {
        self.send
    }

    pub fn recv_available(&self) -> i64 {
        self.recv
    }

    /// Debits `n` bytes of outbound DATA against our send window. Callers
    /// must have already checked `send_available() >= n`.
    pub fn consume_send(&mut self, n: u32) {
        self.send -= n as i64;
    }

    /// A WINDOW_UPDATE from the peer increments our send window. Rejects
    /// overflow past the 31-bit ceiling (RFC 7540 §6.9.1).
    pub fn apply_send_increment(&mut self, increment: u32, scope: impl Fn() -> Http2ConnectionError) -> Result<(), Http2ConnectionError> {
        let updated = self.send.checked_add(increment as i64).ok_or_else(&scope)?;
        if updated > MAX_WINDOW_SIZE {
            return Err(scope());
        }
        self.send = updated;
        Ok(())
    }

    /// A change to SETTINGS_INITIAL_WINDOW_SIZE shifts every open stream's
    /// send window by the same signed delta (RFC 7540 §6.9.2), independent
    /// of any WINDOW_UPDATE frames.
    pub fn shift_send_by_settings_delta(&mut self, delta: i64) -> Result<(), Http2ConnectionError> {
        let updated = self.send.checked_add(delta).ok_or_else(|| {
            Http2ConnectionError::connection(ErrorCode::FlowControlError, "initial window size change overflowed a stream's send window")
        })?;
        if updated > MAX_WINDOW_SIZE {
            return Err(Http2ConnectionError::connection(ErrorCode::FlowControlError, "initial window size change exceeded the 31-bit maximum"));
        }
        self.send = updated;
        Ok(())
    }

    /// Debits `n` bytes of inbound DATA against our advertised receive
    /// window, failing if the peer sent more than we allowed.
    pub fn consume_recv(&mut self, n: u32, scope: impl Fn() -> Http2ConnectionError) -> Result<(), Http2ConnectionError> {
        self.recv -= n as i64;
        if self.recv < 0 {
            return Err(scope());
        }
        Ok(())
    }

    /// We've just emitted a WINDOW_UPDATE for `n` bytes; credit our receive
    /// window back up.
    pub fn replenish_recv(&mut self, n: u32) {
        self.recv += n as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_err() -> Http2ConnectionError {
        Http2ConnectionError::connection(ErrorCode::FlowControlError, "test")
    }

    #[test]
    fn send_window_seeded_from_initial_size() {
        let w = FlowWindow::new(65_535);
        assert_eq!(w.send_available(), 65_535);
        assert_eq!(w.recv_available(), 65_535);
    }

    #[test]
    fn window_update_increments_send_credit() {
        let mut w = FlowWindow::new(0);
        w.apply_send_increment(100, conn_err).unwrap();
        assert_eq!(w.send_available(), 100);
    }

    #[test]
    fn window_update_overflowing_31_bits_is_rejected() {
        let mut w = FlowWindow::new(MAX_WINDOW_SIZE as u32);
        assert!(w.apply_send_increment(1, conn_err).is_err());
    }

    #[test]
    fn settings_initial_window_change_can_drive_send_negative() {
        let mut w = FlowWindow::new(1000);
        w.shift_send_by_settings_delta(-1500).unwrap();
        assert_eq!(w.send_available(), -500);
    }

    #[test]
    fn recv_window_going_negative_is_a_flow_control_error() {
        let mut w = FlowWindow::new(10);
        assert!(w.consume_recv(11, conn_err).is_err());
    }

    #[test]
    fn replenish_recv_restores_advertised_credit() {
        let mut w = FlowWindow::new(10);
        w.consume_recv(10, conn_err).unwrap();
        assert_eq!(w.recv_available(), 0);
        w.replenish_recv(10);
        assert_eq!(w.recv_available(), 10);
    }
}
