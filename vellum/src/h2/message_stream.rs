//! The full per-stream lifecycle: the RFC 7540 §5.1 state machine, header
//! block reassembly across CONTINUATION, DATA send/receive with a
//! backlogged-write queue for backpressure, trailers, and push promises.
//!
//! A stream never talks to the socket or the HPACK tables directly — it
//! records what happened to its own state and hands the rest back to
//! [`super::endpoint::Endpoint`], which owns the connection-wide resources
//! every stream needs to share (spec §5: "single-threaded ownership per
//! connection").

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use bytes::Bytes;

use vellum_core::error::{CloseReason, Http2ConnectionError};

use crate::header::HeaderMap;
use crate::message::{Request, Response};
use crate::socket::WritableSocket;

use super::endpoint::StreamContext;
use super::stream_base::FlowWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    ReservedLocal,
    Reserved,
    HalfClosedLocal,
    HalfClosed,
    Closed,
}

impl StreamState {
    /// Transition after WE send a HEADERS frame (CONTINUATION reassembly
    /// already folded in by the caller — this only cares about the
    /// END_STREAM flag carried on the original HEADERS frame).
    pub(super) fn after_send_headers(self, end_stream: bool) -> Self {
        use StreamState::*;
        match (self, end_stream) {
            (Idle, false) => Open,
            (Idle, true) => HalfClosedLocal,
            (ReservedLocal, false) => HalfClosed,
            (ReservedLocal, true) => Closed,
            (Open, false) => Open,
            (Open, true) => HalfClosedLocal,
            (HalfClosed, false) => HalfClosed,
            (HalfClosed, true) => Closed,
            (other, _) => other,
        }
    }

    pub(super) fn after_recv_headers(self, end_stream: bool) -> Self {
        use StreamState::*;
        match (self, end_stream) {
            (Idle, false) => Open,
            (Idle, true) => HalfClosed,
            (Reserved, false) => HalfClosedLocal,
            (Reserved, true) => Closed,
            (Open, false) => Open,
            (Open, true) => HalfClosed,
            (HalfClosedLocal, false) => HalfClosedLocal,
            (HalfClosedLocal, true) => Closed,
            (other, _) => other,
        }
    }

    pub(super) fn after_send_end_stream(self) -> Self {
        use StreamState::*;
        match self {
            Open => HalfClosedLocal,
            HalfClosed => Closed,
            other => other,
        }
    }

    pub(super) fn after_recv_end_stream(self) -> Self {
        use StreamState::*;
        match self {
            Open => HalfClosed,
            HalfClosedLocal => Closed,
            other => other,
        }
    }

    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }

    /// Whether we are still allowed to send DATA/HEADERS on this stream.
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Idle | StreamState::Open | StreamState::ReservedLocal | StreamState::HalfClosed)
    }

    /// Whether the peer is still allowed to send DATA/HEADERS on this stream.
    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Idle | StreamState::Open | StreamState::Reserved | StreamState::HalfClosedLocal)
    }
}

/// Which half of a request/response pair a stream's received message
/// represents. Set on the first HEADERS; a second HEADERS block on the
/// same stream is trailers, not a second message (spec §4.K).
pub enum StreamRole {
    Request(Rc<RefCell<Request>>),
    Response(Rc<RefCell<Response>>),
}

impl StreamRole {
    pub(super) fn clone_handle(&self) -> Self {
        match self {
            StreamRole::Request(r) => StreamRole::Request(Rc::clone(r)),
            StreamRole::Response(r) => StreamRole::Response(Rc::clone(r)),
        }
    }
}

enum Backlogged {
    Data(Bytes, bool),
    Trailers(HeaderMap),
}

/// The sum-typed event a [`MessageStreamHandler`] is given a single call
/// site for, per spec §9 ("concretely express callback fan-out as one
/// handler value of sum-typed events rather than many mutable function
/// pointers").
pub enum MessageStreamEvent {
    Message(StreamRole),
    Data { bytes: Bytes, end_stream: bool },
    Trailers(HeaderMap),
    PushPromise(Rc<RefCell<Request>>),
    Writable,
    DataFlushed,
    Error(Http2ConnectionError),
    Closed(CloseReason),
}

pub trait MessageStreamHandler<S: WritableSocket> {
    fn handle(&mut self, ctx: &mut StreamContext<'_, S>, event: MessageStreamEvent);
}

pub struct MessageStream<S: WritableSocket> {
    id: u32,
    is_push: bool,
    state: StreamState,
    window: FlowWindow,
    role: Option<StreamRole>,
    seen_message: bool,
    header_block: Vec<u8>,
    expecting_continuation: bool,
    end_stream_pending: bool,
    pending_push_target: Option<u32>,
    backlog: VecDeque<Backlogged>,
    paused: bool,
    closed_at: Option<Instant>,
    handler: Option<Box<dyn MessageStreamHandler<S>>>,
}

impl<S: WritableSocket> MessageStream<S> {
    pub(super) fn new(id: u32, is_push: bool, initial_state: StreamState, initial_window: u32) -> Self {
        Self {
            id,
            is_push,
            state: initial_state,
            window: FlowWindow::new(initial_window),
            role: None,
            seen_message: false,
            header_block: Vec::new(),
            expecting_continuation: false,
            end_stream_pending: false,
            pending_push_target: None,
            backlog: VecDeque::new(),
            paused: false,
            closed_at: None,
            handler: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_push(&self) -> bool {
        self.is_push
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub(super) fn set_state(&mut self, state: StreamState) {
        self.state = state;
    }

    pub fn role(&self) -> Option<&StreamRole> {
        self.role.as_ref()
    }

    pub(super) fn set_role(&mut self, role: StreamRole) {
        self.role = Some(role);
    }

    pub fn has_seen_message(&self) -> bool {
        self.seen_message
    }

    pub(super) fn mark_seen_message(&mut self) {
        self.seen_message = true;
    }

    pub fn window(&self) -> &FlowWindow {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut FlowWindow {
        &mut self.window
    }

    pub(super) fn take_handler(&mut self) -> Option<Box<dyn MessageStreamHandler<S>>> {
        self.handler.take()
    }

    pub(super) fn restore_handler(&mut self, handler: Box<dyn MessageStreamHandler<S>>) {
        self.handler = Some(handler);
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    pub(super) fn queue_data(&mut self, bytes: Bytes, end_stream: bool) {
        self.backlog.push_back(Backlogged::Data(bytes, end_stream));
    }

    pub(super) fn queue_trailers(&mut self, trailers: HeaderMap) {
        self.backlog.push_back(Backlogged::Trailers(trailers));
    }

    pub(super) fn requeue_data_front(&mut self, bytes: Bytes, end_stream: bool) {
        self.backlog.push_front(Backlogged::Data(bytes, end_stream));
    }

    /// Pops the next backlogged DATA chunk, but only if the queue's head is
    /// actually DATA — trailers must drain strictly after every prior DATA
    /// chunk has gone out.
    pub(super) fn pop_backlog_data(&mut self) -> Option<(Bytes, bool)> {
        match self.backlog.front() {
            Some(Backlogged::Data(_, _)) => match self.backlog.pop_front() {
                Some(Backlogged::Data(b, e)) => Some((b, e)),
                _ => unreachable!(),
            },
            _ => None,
        }
    }

    pub(super) fn pop_backlog_trailers(&mut self) -> Option<HeaderMap> {
        match self.backlog.front() {
            Some(Backlogged::Trailers(_)) => match self.backlog.pop_front() {
                Some(Backlogged::Trailers(t)) => Some(t),
                _ => unreachable!(),
            },
            _ => None,
        }
    }

    pub(super) fn mark_closed(&mut self) {
        self.state = StreamState::Closed;
        self.closed_at = Some(Instant::now());
    }

    pub fn closed_at(&self) -> Option<Instant> {
        self.closed_at
    }

    /// Accumulates a HEADERS/PUSH_PROMISE/CONTINUATION fragment, enforcing
    /// the header-list-size cap while it grows (spec §4.K: the
    /// CONTINUATION buffer is itself bounded by `max_header_list_size`).
    pub(super) fn push_header_fragment(&mut self, fragment: &[u8], cap: u32) -> Result<(), Http2ConnectionError> {
        if self.header_block.len() + fragment.len() > cap as usize {
            return Err(Http2ConnectionError::stream(
                self.id,
                vellum_core::error::ErrorCode::EnhanceYourCalm,
                "accumulated header block exceeded the configured limit",
            ));
        }
        self.header_block.extend_from_slice(fragment);
        Ok(())
    }

    pub(super) fn take_header_block(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.header_block)
    }

    pub(super) fn is_expecting_continuation(&self) -> bool {
        self.expecting_continuation
    }

    /// `push_target` is `Some(promised_stream_id)` when this header block
    /// belongs to a PUSH_PROMISE rather than an ordinary HEADERS frame — it
    /// arrives on the *originating* stream, not the promised one (RFC 7540
    /// §6.6: PUSH_PROMISE and its CONTINUATIONs share the stream id of the
    /// request that provoked the push).
    pub(super) fn start_header_block(&mut self, end_stream: bool, push_target: Option<u32>) {
        self.expecting_continuation = true;
        self.end_stream_pending = end_stream;
        self.pending_push_target = push_target;
    }

    /// Call once the frame carrying END_HEADERS has arrived; returns the
    /// END_STREAM value stashed from the opening HEADERS frame alongside the
    /// push-promise target stream id, if this block was a PUSH_PROMISE's.
    pub(super) fn finish_header_block(&mut self) -> (bool, Option<u32>) {
        self.expecting_continuation = false;
        (self.end_stream_pending, self.pending_push_target.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_stream_opens_on_headers_without_end_stream() {
        assert_eq!(StreamState::Idle.after_recv_headers(false), StreamState::Open);
        assert_eq!(StreamState::Idle.after_send_headers(false), StreamState::Open);
    }

    #[test]
    fn idle_stream_half_closes_on_headers_with_end_stream() {
        assert_eq!(StreamState::Idle.after_recv_headers(true), StreamState::HalfClosed);
        assert_eq!(StreamState::Idle.after_send_headers(true), StreamState::HalfClosedLocal);
    }

    #[test]
    fn open_stream_closes_once_both_sides_end() {
        let s = StreamState::Open.after_send_end_stream();
        assert_eq!(s, StreamState::HalfClosedLocal);
        assert_eq!(s.after_recv_end_stream(), StreamState::Closed);
    }

    #[test]
    fn reserved_local_moves_to_half_closed_then_closed() {
        let s = StreamState::ReservedLocal.after_send_headers(false);
        assert_eq!(s, StreamState::HalfClosed);
        assert_eq!(s.after_send_end_stream(), StreamState::Closed);
    }

    #[test]
    fn reserved_remote_moves_to_half_closed_local_then_closed() {
        let s = StreamState::Reserved.after_recv_headers(false);
        assert_eq!(s, StreamState::HalfClosedLocal);
        assert_eq!(s.after_recv_end_stream(), StreamState::Closed);
    }

    #[test]
    fn can_send_and_can_recv_reflect_half_closed_direction() {
        assert!(!StreamState::HalfClosedLocal.can_send());
        assert!(StreamState::HalfClosedLocal.can_recv());
        assert!(StreamState::HalfClosed.can_send());
        assert!(!StreamState::HalfClosed.can_recv());
    }
}
