//! The connection object (RFC 7540 §5): frame reassembly and dispatch,
//! stream bookkeeping, and every send-path operation an application drives
//! through a [`StreamContext`]. One `Endpoint` per connection, owned
//! single-threaded by whatever embeds it (spec §5).
//!
//! Reentrancy: application callbacks run from inside `receive()` and are
//! free to call back into the endpoint (`ctx.send_data(...)`, `ctx.rst(...)`)
//! without risking a double borrow. Each handler is taken out of its slot
//! before it runs and put back afterward — there is no `Rc<RefCell<Self>>`
//! anywhere in this module.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::cell::RefCell;
use std::time::Instant;

use bytes::Bytes;

use vellum_core::config::EndpointLimits;
use vellum_core::error::{CloseReason, ErrorCode, ErrorScope, Http2ConnectionError};

use crate::frame::{flags, FrameHeader, FrameType, RawFrameHeader, FRAME_HEADER_LEN};
use crate::header::HeaderMap;
use crate::hpack;
use crate::message::{HttpVersion, Request, Response, Scheme};
use crate::socket::WritableSocket;

use super::control::ControlStream;
use super::message_stream::{MessageStream, MessageStreamEvent, MessageStreamHandler, StreamRole, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Callback surface for connection-level events the application must act
/// on: a peer just opened a stream (an inbound request for a server, a
/// pushed stream for a client) and the endpoint needs a handler to deliver
/// its events to.
pub trait EndpointHandler<S: WritableSocket> {
    fn on_new_stream(&mut self, ctx: &mut StreamContext<'_, S>) -> Box<dyn MessageStreamHandler<S>>;
}

/// A borrow of the endpoint scoped to one stream, handed to application
/// code during event dispatch. Everything here just forwards to the
/// matching `Endpoint` method with `stream_id` already filled in.
pub struct StreamContext<'a, S: WritableSocket> {
    endpoint: &'a mut Endpoint<S>,
    stream_id: u32,
}

impl<'a, S: WritableSocket> StreamContext<'a, S> {
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    pub fn endpoint(&self) -> &Endpoint<S> {
        self.endpoint
    }

    pub fn send_response(&mut self, response: Response, end_stream: bool) -> Result<(), Http2ConnectionError> {
        self.endpoint.send_response(self.stream_id, response, end_stream)
    }

    pub fn send_data(&mut self, bytes: Bytes, end_stream: bool) -> Result<bool, Http2ConnectionError> {
        self.endpoint.send_data(self.stream_id, bytes, end_stream)
    }

    pub fn send_trailers(&mut self, trailers: HeaderMap) -> Result<(), Http2ConnectionError> {
        self.endpoint.send_trailers(self.stream_id, trailers)
    }

    pub fn rst(&mut self, code: ErrorCode) -> Result<(), Http2ConnectionError> {
        self.endpoint.rst_stream(self.stream_id, code)
    }

    pub fn pause(&mut self) {
        if let Some(stream) = self.endpoint.streams.get_mut(&self.stream_id) {
            stream.pause();
        }
    }

    pub fn resume(&mut self) {
        if let Some(stream) = self.endpoint.streams.get_mut(&self.stream_id) {
            stream.resume();
        }
        let increment = self.endpoint.control.local.initial_window_size;
        if increment > 0 {
            if let Some(stream) = self.endpoint.streams.get_mut(&self.stream_id) {
                stream.window_mut().replenish_recv(increment);
            }
            let mut out = Vec::new();
            FrameHeader::write_frame(FrameType::WindowUpdate, 0, self.stream_id, &increment.to_be_bytes(), &mut out);
            let _ = self.endpoint.write_fully(&out);
        }
        self.endpoint.drain_backlog(self.stream_id);
    }

    /// Server-only: promise `request` to the peer as a push associated with
    /// this stream. Returns the new stream's id.
    pub fn push_promise(&mut self, request: Request) -> Result<u32, Http2ConnectionError> {
        self.endpoint.send_push_promise(self.stream_id, request)
    }
}

pub struct Endpoint<S: WritableSocket> {
    socket: S,
    role: Role,
    limits: EndpointLimits,
    encoder: hpack::Encoder,
    decoder: hpack::Decoder,
    control: ControlStream,
    streams: HashMap<u32, MessageStream<S>>,
    close_wait: VecDeque<(u32, Instant)>,
    peer_initiated: HashSet<u32>,
    highest_peer_stream_id: u32,
    next_local_stream_id: u32,
    preface_consumed: bool,
    inbound: Vec<u8>,
    consecutive_unwritable_errors: u32,
    closed: bool,
    handler: Option<Box<dyn EndpointHandler<S>>>,
}

impl<S: WritableSocket> Endpoint<S> {
    pub fn new_client(socket: S, limits: EndpointLimits, handler: Box<dyn EndpointHandler<S>>) -> Result<Self, Http2ConnectionError> {
        Self::new(socket, Role::Client, limits, handler)
    }

    pub fn new_server(socket: S, limits: EndpointLimits, handler: Box<dyn EndpointHandler<S>>) -> Result<Self, Http2ConnectionError> {
        Self::new(socket, Role::Server, limits, handler)
    }

    fn new(socket: S, role: Role, limits: EndpointLimits, handler: Box<dyn EndpointHandler<S>>) -> Result<Self, Http2ConnectionError> {
        let session = hpack::Session::new();
        let control = ControlStream::new(&limits);
        let mut endpoint = Self {
            socket,
            role,
            encoder: session.new_encoder(limits.header_table_size),
            decoder: session.new_decoder(limits.header_table_size),
            control,
            streams: HashMap::new(),
            close_wait: VecDeque::new(),
            peer_initiated: HashSet::new(),
            highest_peer_stream_id: 0,
            next_local_stream_id: if role == Role::Client { 1 } else { 2 },
            preface_consumed: role == Role::Client,
            inbound: Vec::new(),
            consecutive_unwritable_errors: 0,
            closed: false,
            handler: Some(handler),
            limits,
        };
        if role == Role::Client {
            endpoint.write_fully(super::PREFACE)?;
        }
        let settings_frame = endpoint.control.build_initial_settings_frame();
        endpoint.write_fully(&settings_frame)?;
        Ok(endpoint)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stream(&self, id: u32) -> Option<&MessageStream<S>> {
        self.streams.get(&id)
    }

    // ---- inbound -----------------------------------------------------

    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), Http2ConnectionError> {
        if self.closed {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "receive() called on an already-closed connection"));
        }
        self.inbound.extend_from_slice(bytes);

        if self.role == Role::Server && !self.preface_consumed {
            if self.inbound.len() < super::PREFACE.len() {
                return Ok(());
            }
            if &self.inbound[..super::PREFACE.len()] != super::PREFACE {
                return self.fail_connection(ErrorCode::ProtocolError, "client preface did not match");
            }
            self.inbound.drain(..super::PREFACE.len());
            self.preface_consumed = true;
        }

        loop {
            if self.inbound.len() < FRAME_HEADER_LEN {
                break;
            }
            let (raw, _) = FrameHeader::decode(&self.inbound[..FRAME_HEADER_LEN]);
            if crate::frame::length_exceeds(raw.length, self.limits.max_frame_size) {
                return self.fail_connection(ErrorCode::FrameSizeError, "frame exceeded the configured MAX_FRAME_SIZE");
            }
            let total = FRAME_HEADER_LEN + raw.length as usize;
            if self.inbound.len() < total {
                break;
            }
            let payload: Vec<u8> = self.inbound[FRAME_HEADER_LEN..total].to_vec();
            self.inbound.drain(..total);

            if let Err(err) = self.dispatch(raw, &payload) {
                match err.scope {
                    ErrorScope::Connection => return self.fail_connection_with(err),
                    ErrorScope::Stream(id) => {
                        vellum_core::log_warn!(stream_id = id, code = %err.code, "resetting stream after a protocol violation");
                        let _ = self.rst_stream(id, err.code);
                    }
                }
            }
            self.gc_close_wait();
        }

        self.drain_all_backlogs();
        Ok(())
    }

    fn dispatch(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        match raw.frame_type() {
            Some(FrameType::Data) => self.handle_data(raw, payload),
            Some(FrameType::Headers) => self.handle_headers(raw, payload),
            // RFC 7540 §5.3: priority signaling is accepted but the
            // dependency tree itself is out of scope.
            Some(FrameType::Priority) => Ok(()),
            Some(FrameType::RstStream) => self.handle_rst_stream(raw, payload),
            Some(FrameType::Settings) => self.handle_settings(raw, payload),
            Some(FrameType::PushPromise) => self.handle_push_promise(raw, payload),
            Some(FrameType::Ping) => self.handle_ping(raw, payload),
            Some(FrameType::GoAway) => self.handle_goaway(raw, payload),
            Some(FrameType::WindowUpdate) => self.handle_window_update(raw, payload),
            Some(FrameType::Continuation) => self.handle_continuation(raw, payload),
            // RFC 7540 §4.1: unknown frame types are ignored.
            None => Ok(()),
        }
    }

    fn handle_headers(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        let stream_id = raw.stream_id;
        if stream_id == 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "HEADERS on stream 0"));
        }
        let end_stream = raw.flags & flags::END_STREAM != 0;
        let end_headers = raw.flags & flags::END_HEADERS != 0;
        let fragment = strip_padding_and_priority(payload, raw.flags)?;

        if !self.streams.contains_key(&stream_id) {
            self.admit_peer_stream(stream_id)?;
        }

        let cap = self.limits.max_header_list_size;
        let finished = {
            let stream = self.streams.get_mut(&stream_id).expect("just admitted or already present");
            if !stream.state().can_recv() {
                return Err(Http2ConnectionError::stream(stream_id, ErrorCode::StreamClosed, "HEADERS on a stream not open to receive"));
            }
            stream.push_header_fragment(&fragment, cap)?;
            stream.start_header_block(end_stream, None);
            if !end_headers {
                None
            } else {
                Some(stream.finish_header_block())
            }
        };
        match finished {
            None => Ok(()),
            Some((end_stream, _)) => self.finish_headers(stream_id, end_stream),
        }
    }

    fn handle_continuation(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        let stream_id = raw.stream_id;
        let end_headers = raw.flags & flags::END_HEADERS != 0;
        let cap = self.limits.max_header_list_size;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "CONTINUATION on an unknown stream"));
        };
        if !stream.is_expecting_continuation() {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "CONTINUATION without a preceding HEADERS/PUSH_PROMISE"));
        }
        stream.push_header_fragment(payload, cap)?;
        if !end_headers {
            return Ok(());
        }
        let (end_stream, push_target) = stream.finish_header_block();
        match push_target {
            Some(promised_id) => self.finish_push_promise(stream_id, promised_id),
            None => self.finish_headers(stream_id, end_stream),
        }
    }

    /// Decodes the now-complete header block, builds the Request/Response
    /// or Trailers event, and fires it.
    fn finish_headers(&mut self, stream_id: u32, end_stream: bool) -> Result<(), Http2ConnectionError> {
        let block = self.streams.get_mut(&stream_id).map(|s| s.take_header_block()).unwrap_or_default();
        let headers = self
            .decoder
            .decode(&block)
            .map_err(|e| Http2ConnectionError::connection(ErrorCode::CompressionError, e.to_string()))?;

        let is_new_message = self.streams.get(&stream_id).map(|s| !s.has_seen_message()).unwrap_or(false);

        let event = if is_new_message {
            let version = HttpVersion::Http2;
            let role = match self.role {
                Role::Server => StreamRole::Request(Rc::new(RefCell::new(parse_request(headers, version, stream_id)?))),
                Role::Client => StreamRole::Response(Rc::new(RefCell::new(parse_response(headers, version, stream_id)?))),
            };
            let event = MessageStreamEvent::Message(role.clone_handle());
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.set_role(role);
                stream.mark_seen_message();
            }
            event
        } else {
            MessageStreamEvent::Trailers(headers)
        };

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            let next = stream.state().after_recv_headers(end_stream);
            stream.set_state(next);
        }

        self.dispatch_event(stream_id, event);
        self.check_stream_closed(stream_id);
        Ok(())
    }

    fn handle_push_promise(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        if self.role != Role::Client {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PUSH_PROMISE received by a server"));
        }
        if !self.control.local.enable_push {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PUSH_PROMISE received after disabling push locally"));
        }
        let origin_stream_id = raw.stream_id;
        if origin_stream_id == 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PUSH_PROMISE on stream 0"));
        }
        let end_headers = raw.flags & flags::END_HEADERS != 0;
        let stripped = strip_padding_only(payload, raw.flags)?;
        if stripped.len() < 4 {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "PUSH_PROMISE payload too short for a promised stream id"));
        }
        let promised_stream_id = u32::from_be_bytes([stripped[0], stripped[1], stripped[2], stripped[3]]) & 0x7fff_ffff;
        let fragment = &stripped[4..];

        if promised_stream_id % 2 != 0 || promised_stream_id <= self.highest_peer_stream_id {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PUSH_PROMISE named an invalid or non-monotonic stream id"));
        }
        self.highest_peer_stream_id = self.highest_peer_stream_id.max(promised_stream_id);
        self.peer_initiated.insert(promised_stream_id);
        self.streams.insert(
            promised_stream_id,
            MessageStream::new(promised_stream_id, true, StreamState::Reserved, self.control.local.initial_window_size),
        );

        let cap = self.limits.max_header_list_size;
        let Some(origin) = self.streams.get_mut(&origin_stream_id) else {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PUSH_PROMISE referenced an unknown originating stream"));
        };
        origin.push_header_fragment(fragment, cap)?;
        origin.start_header_block(false, Some(promised_stream_id));
        if !end_headers {
            return Ok(());
        }
        let (_, push_target) = origin.finish_header_block();
        self.finish_push_promise(origin_stream_id, push_target.expect("start_header_block just set it"))
    }

    fn finish_push_promise(&mut self, origin_stream_id: u32, promised_stream_id: u32) -> Result<(), Http2ConnectionError> {
        let block = self.streams.get_mut(&origin_stream_id).map(|s| s.take_header_block()).unwrap_or_default();
        let headers = self
            .decoder
            .decode(&block)
            .map_err(|e| Http2ConnectionError::connection(ErrorCode::CompressionError, e.to_string()))?;
        let request = parse_request(headers, HttpVersion::Http2, promised_stream_id)?;
        let request = Rc::new(RefCell::new(request));
        if let Some(stream) = self.streams.get_mut(&promised_stream_id) {
            stream.set_role(StreamRole::Request(Rc::clone(&request)));
            stream.mark_seen_message();
        }
        self.dispatch_event(origin_stream_id, MessageStreamEvent::PushPromise(request));
        Ok(())
    }

    fn handle_data(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        let stream_id = raw.stream_id;
        if stream_id == 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "DATA on stream 0"));
        }
        let end_stream = raw.flags & flags::END_STREAM != 0;
        let data = strip_padding_only(payload, raw.flags)?;
        let frame_len = raw.length;

        self.control
            .window
            .consume_recv(frame_len, || Http2ConnectionError::connection(ErrorCode::FlowControlError, "connection receive window exceeded"))?;

        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "DATA on an unknown stream"));
        };
        if !stream.state().can_recv() {
            return Err(Http2ConnectionError::stream(stream_id, ErrorCode::StreamClosed, "DATA on a stream not open to receive"));
        }
        stream
            .window_mut()
            .consume_recv(frame_len, || Http2ConnectionError::stream(stream_id, ErrorCode::FlowControlError, "stream receive window exceeded"))?;
        if end_stream {
            let next = stream.state().after_recv_end_stream();
            stream.set_state(next);
        }

        let bytes = Bytes::copy_from_slice(data);
        self.dispatch_event(stream_id, MessageStreamEvent::Data { bytes, end_stream });

        self.replenish_after_data(stream_id, frame_len);
        self.check_stream_closed(stream_id);
        Ok(())
    }

    /// Default auto-flow-control policy: credit the connection back exactly
    /// what we just consumed unconditionally, and the stream back double
    /// that, but only while the stream is still receiving — a paused stream
    /// gets no stream-level WINDOW_UPDATE, so the peer's send window drains
    /// and backpressure actually reaches it.
    fn replenish_after_data(&mut self, stream_id: u32, consumed: u32) {
        if consumed == 0 {
            return;
        }
        let conn_update = self.control.build_window_update(consumed);
        let _ = self.write_fully(&conn_update);

        let paused = self.streams.get(&stream_id).map(|s| s.is_paused()).unwrap_or(true);
        if paused {
            return;
        }

        let increment = consumed.saturating_mul(2);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.window_mut().replenish_recv(increment);
        }
        let mut stream_update = Vec::new();
        FrameHeader::write_frame(FrameType::WindowUpdate, 0, stream_id, &increment.to_be_bytes(), &mut stream_update);
        let _ = self.write_fully(&stream_update);
    }

    fn handle_rst_stream(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        let stream_id = raw.stream_id;
        if stream_id == 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "RST_STREAM on stream 0"));
        }
        if payload.len() != 4 {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "RST_STREAM payload must be 4 bytes"));
        }
        let code = ErrorCode::from_u32(u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]));
        if !self.streams.contains_key(&stream_id) {
            // RFC 7540 §5.1: a late RST_STREAM for a stream we already
            // forgot about is not an error.
            return Ok(());
        }
        self.dispatch_event(stream_id, MessageStreamEvent::Closed(CloseReason::from_error_code(code)));
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.mark_closed();
        }
        self.close_wait.push_back((stream_id, Instant::now()));
        Ok(())
    }

    fn handle_settings(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        if raw.stream_id != 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "SETTINGS on a non-zero stream"));
        }
        if raw.flags & flags::ACK != 0 {
            if !payload.is_empty() {
                return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "SETTINGS ACK must carry an empty payload"));
            }
            return Ok(());
        }

        let old_header_table_size = self.control.peer.header_table_size;
        let delta = self.control.apply_peer_settings(payload)?;
        if let Some(delta) = delta {
            for stream in self.streams.values_mut() {
                if !stream.state().is_closed() {
                    stream.window_mut().shift_send_by_settings_delta(delta)?;
                }
            }
        }
        if self.control.peer.header_table_size != old_header_table_size {
            self.encoder.set_settings_ceiling(self.control.peer.header_table_size);
        }

        let ack = self.control.build_settings_ack();
        self.write_fully(&ack)?;
        self.drain_all_backlogs();
        Ok(())
    }

    fn handle_ping(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        if raw.stream_id != 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "PING on a non-zero stream"));
        }
        if payload.len() != 8 {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "PING payload must be 8 bytes"));
        }
        if raw.flags & flags::ACK != 0 {
            self.control.handle_ping_ack(payload);
            return Ok(());
        }
        let ack = ControlStream::build_ping_ack(payload);
        self.write_fully(&ack)
    }

    fn handle_goaway(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        if raw.stream_id != 0 {
            return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "GOAWAY on a non-zero stream"));
        }
        let Some((last_stream_id, code, _debug)) = ControlStream::parse_goaway_payload(payload) else {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "GOAWAY payload too short"));
        };
        self.control.note_goaway_received();
        vellum_core::log_warn!(last_stream_id, code = %code, "peer sent GOAWAY");
        let stale: Vec<u32> = self
            .streams
            .iter()
            .filter(|(id, stream)| **id > last_stream_id && !stream.state().is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(stream) = self.streams.get_mut(&id) {
                stream.mark_closed();
            }
            self.dispatch_event(id, MessageStreamEvent::Closed(CloseReason::Cancel));
        }
        Ok(())
    }

    fn handle_window_update(&mut self, raw: RawFrameHeader, payload: &[u8]) -> Result<(), Http2ConnectionError> {
        if payload.len() != 4 {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "WINDOW_UPDATE payload must be 4 bytes"));
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
        if increment == 0 {
            return Err(if raw.stream_id == 0 {
                Http2ConnectionError::connection(ErrorCode::ProtocolError, "WINDOW_UPDATE increment must be nonzero")
            } else {
                Http2ConnectionError::stream(raw.stream_id, ErrorCode::ProtocolError, "WINDOW_UPDATE increment must be nonzero")
            });
        }
        if raw.stream_id == 0 {
            self.control.apply_window_update(increment)?;
        } else if let Some(stream) = self.streams.get_mut(&raw.stream_id) {
            let id = raw.stream_id;
            stream
                .window_mut()
                .apply_send_increment(increment, || Http2ConnectionError::stream(id, ErrorCode::FlowControlError, "stream send window overflowed"))?;
        }
        self.drain_all_backlogs();
        Ok(())
    }

    // ---- dispatch to application --------------------------------------

    /// Takes the stream's handler out, hands it a `StreamContext` borrowing
    /// `self` mutably, then puts it back. This is the only place a
    /// `MessageStreamHandler` ever runs, and it is what makes it safe for
    /// application code to call straight back into `ctx.send_data` etc.
    /// from inside its own event handler.
    fn dispatch_event(&mut self, stream_id: u32, event: MessageStreamEvent) {
        let Some(mut handler) = self.streams.get_mut(&stream_id).and_then(|s| s.take_handler()) else {
            return;
        };
        {
            let mut ctx = StreamContext { endpoint: self, stream_id };
            handler.handle(&mut ctx, event);
        }
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.restore_handler(handler);
        }
    }

    fn accept_new_stream(&mut self, stream_id: u32) -> Box<dyn MessageStreamHandler<S>> {
        let mut endpoint_handler = self.handler.take().expect("an endpoint always carries its handler between dispatches");
        let boxed = {
            let mut ctx = StreamContext { endpoint: self, stream_id };
            endpoint_handler.on_new_stream(&mut ctx)
        };
        self.handler = Some(endpoint_handler);
        boxed
    }

    fn admit_peer_stream(&mut self, stream_id: u32) -> Result<(), Http2ConnectionError> {
        if self.role == Role::Client {
            return Err(Http2ConnectionError::connection(
                ErrorCode::ProtocolError,
                "a server attempted to open a new stream outside of PUSH_PROMISE",
            ));
        }
        if stream_id % 2 != 1 || stream_id <= self.highest_peer_stream_id {
            return Err(Http2ConnectionError::connection(
                ErrorCode::ProtocolError,
                "HEADERS named an invalid or non-monotonic new stream id",
            ));
        }
        let open_peer_streams = self
            .peer_initiated
            .iter()
            .filter(|id| self.streams.get(id).map(|s| !s.state().is_closed()).unwrap_or(false))
            .count() as u32;
        if open_peer_streams >= self.limits.max_concurrent_streams {
            return Err(Http2ConnectionError::stream(stream_id, ErrorCode::RefusedStream, "max concurrent streams exceeded"));
        }

        self.highest_peer_stream_id = stream_id;
        self.peer_initiated.insert(stream_id);
        self.streams
            .insert(stream_id, MessageStream::new(stream_id, false, StreamState::Idle, self.control.local.initial_window_size));
        let handler = self.accept_new_stream(stream_id);
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.restore_handler(handler);
        }
        Ok(())
    }

    fn check_stream_closed(&mut self, stream_id: u32) {
        let just_closed = self
            .streams
            .get(&stream_id)
            .map(|s| s.state().is_closed() && s.closed_at().is_none())
            .unwrap_or(false);
        if !just_closed {
            return;
        }
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.mark_closed();
        }
        self.dispatch_event(stream_id, MessageStreamEvent::Closed(CloseReason::Unknown));
        self.close_wait.push_back((stream_id, Instant::now()));
    }

    fn gc_close_wait(&mut self) {
        let grace = self.limits.close_wait_grace;
        let now = Instant::now();
        while let Some((id, at)) = self.close_wait.front().copied() {
            if now.duration_since(at) < grace {
                break;
            }
            self.close_wait.pop_front();
            self.streams.remove(&id);
            self.peer_initiated.remove(&id);
        }
    }

    // ---- outbound ------------------------------------------------------

    /// Client-only: opens a new request stream and sends its HEADERS.
    pub fn create_request_stream(&mut self, request: Request, end_stream: bool) -> Result<u32, Http2ConnectionError> {
        if self.role != Role::Client {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "only a client endpoint can create request streams"));
        }
        let id = self.next_local_stream_id;
        self.next_local_stream_id += 2;

        let mut req = request;
        req.common_mut().lock();
        let header_map = build_request_header_block(&req);
        let block = self.encoder.encode(&header_map);
        self.write_headers_frames(id, &block, end_stream)?;

        let mut stream = MessageStream::new(id, false, StreamState::Idle, self.control.local.initial_window_size);
        let next_state = stream.state().after_send_headers(end_stream);
        stream.set_state(next_state);
        stream.set_role(StreamRole::Request(Rc::new(RefCell::new(req))));
        stream.mark_seen_message();
        self.streams.insert(id, stream);
        self.check_stream_closed(id);
        Ok(id)
    }

    pub fn send_response(&mut self, stream_id: u32, response: Response, end_stream: bool) -> Result<(), Http2ConnectionError> {
        if !self.streams.contains_key(&stream_id) {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "send_response on an unknown stream"));
        }
        let mut resp = response;
        resp.common_mut().lock();
        let header_map = build_response_header_block(&resp);
        let block = self.encoder.encode(&header_map);
        self.write_headers_frames(stream_id, &block, end_stream)?;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            let next = stream.state().after_send_headers(end_stream);
            stream.set_state(next);
        }
        self.check_stream_closed(stream_id);
        Ok(())
    }

    pub fn send_trailers(&mut self, stream_id: u32, trailers: HeaderMap) -> Result<(), Http2ConnectionError> {
        let has_backlog = self.streams.get(&stream_id).map(|s| s.has_backlog()).unwrap_or(false);
        if has_backlog {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.queue_trailers(trailers);
            }
            return Ok(());
        }
        let block = self.encoder.encode(&trailers);
        self.write_headers_frames(stream_id, &block, true)?;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            let next = stream.state().after_send_end_stream();
            stream.set_state(next);
        }
        self.check_stream_closed(stream_id);
        Ok(())
    }

    /// Queues or writes `bytes` as DATA. Returns `Ok(true)` once the bytes
    /// have actually gone out, `Ok(false)` if they were backlogged behind
    /// flow-control credit or socket writability (spec §4.K).
    pub fn send_data(&mut self, stream_id: u32, bytes: Bytes, end_stream: bool) -> Result<bool, Http2ConnectionError> {
        let already_backlogged = self.streams.get(&stream_id).map(|s| s.has_backlog()).unwrap_or(false);
        if already_backlogged || !self.socket.is_writable() {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.queue_data(bytes, end_stream);
            }
            return Ok(false);
        }
        self.write_data_now(stream_id, bytes, end_stream)
    }

    fn write_data_now(&mut self, stream_id: u32, bytes: Bytes, end_stream: bool) -> Result<bool, Http2ConnectionError> {
        let Some(stream) = self.streams.get(&stream_id) else {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "send_data on an unknown stream"));
        };
        if !stream.state().can_send() {
            return Err(Http2ConnectionError::stream(stream_id, ErrorCode::StreamClosed, "send_data on a stream not open to send"));
        }

        let conn_avail = self.control.window.send_available().max(0) as usize;
        let stream_avail = stream.window().send_available().max(0) as usize;
        let avail = conn_avail.min(stream_avail).min(bytes.len());

        if avail == 0 {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.requeue_data_front(bytes, end_stream);
            }
            return Ok(false);
        }

        // Write as much as the window allows; whatever doesn't fit is
        // requeued rather than held back in its entirety (spec'd partial
        // send, not all-or-nothing).
        let to_send = bytes.slice(0..avail);
        let remainder = bytes.slice(avail..);
        let send_end_stream = end_stream && remainder.is_empty();

        let max_frame = (self.control.peer.max_frame_size as usize).max(1);
        let mut offset = 0usize;
        while offset < to_send.len() {
            let end = (offset + max_frame).min(to_send.len());
            let chunk = to_send.slice(offset..end);
            let is_last = end == to_send.len();
            let mut frame_flags = 0;
            if send_end_stream && is_last {
                frame_flags |= flags::END_STREAM;
            }
            let mut out = Vec::new();
            FrameHeader::write_frame(FrameType::Data, frame_flags, stream_id, &chunk, &mut out);
            if !self.write_out(&out)? {
                let mut unsent = bytes::BytesMut::with_capacity((to_send.len() - offset) + remainder.len());
                unsent.extend_from_slice(&to_send[offset..]);
                unsent.extend_from_slice(&remainder);
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.requeue_data_front(unsent.freeze(), end_stream);
                }
                return Ok(false);
            }
            self.control.window.consume_send(chunk.len() as u32);
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.window_mut().consume_send(chunk.len() as u32);
            }
            offset = end;
        }

        if !remainder.is_empty() {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                stream.requeue_data_front(remainder, end_stream);
            }
            return Ok(false);
        }

        if end_stream {
            if let Some(stream) = self.streams.get_mut(&stream_id) {
                let next = stream.state().after_send_end_stream();
                stream.set_state(next);
            }
            self.check_stream_closed(stream_id);
        }
        Ok(true)
    }

    pub fn rst_stream(&mut self, stream_id: u32, code: ErrorCode) -> Result<(), Http2ConnectionError> {
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::RstStream, 0, stream_id, &code.as_u32().to_be_bytes(), &mut out);
        self.write_fully(&out)?;
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.mark_closed();
        }
        self.close_wait.push_back((stream_id, Instant::now()));
        Ok(())
    }

    /// Server-only: promises `request` to the peer on a freshly reserved
    /// even-numbered stream, returning its id so the caller can follow up
    /// with `send_response`/`send_data` once it's ready.
    fn send_push_promise(&mut self, origin_stream_id: u32, request: Request) -> Result<u32, Http2ConnectionError> {
        if self.role != Role::Server {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "only a server endpoint can send PUSH_PROMISE"));
        }
        if !self.control.peer.enable_push {
            return Err(Http2ConnectionError::stream(origin_stream_id, ErrorCode::RefusedStream, "peer has disabled push"));
        }
        let promised_id = self.next_local_stream_id;
        self.next_local_stream_id += 2;

        let mut req = request;
        req.common_mut().lock();
        let header_map = build_request_header_block(&req);
        let block = self.encoder.encode(&header_map);

        let max_frame = (self.control.peer.max_frame_size as usize).max(1);
        let first_len = block.len().min(max_frame.saturating_sub(4));
        let mut first_payload = Vec::with_capacity(4 + first_len);
        first_payload.extend_from_slice(&(promised_id & 0x7fff_ffff).to_be_bytes());
        first_payload.extend_from_slice(&block[..first_len]);
        let remainder = &block[first_len..];
        let mut flags_byte = 0;
        if remainder.is_empty() {
            flags_byte |= flags::END_HEADERS;
        }
        let mut out = Vec::new();
        FrameHeader::write_frame(FrameType::PushPromise, flags_byte, origin_stream_id, &first_payload, &mut out);
        self.write_fully(&out)?;

        let mut offset = 0usize;
        while offset < remainder.len() {
            let end = (offset + max_frame).min(remainder.len());
            let is_last = end == remainder.len();
            let mut f = 0;
            if is_last {
                f |= flags::END_HEADERS;
            }
            let mut cont = Vec::new();
            FrameHeader::write_frame(FrameType::Continuation, f, origin_stream_id, &remainder[offset..end], &mut cont);
            self.write_fully(&cont)?;
            offset = end;
        }

        let mut stream = MessageStream::new(promised_id, true, StreamState::ReservedLocal, self.control.local.initial_window_size);
        stream.set_role(StreamRole::Request(Rc::new(RefCell::new(req))));
        stream.mark_seen_message();
        self.streams.insert(promised_id, stream);
        Ok(promised_id)
    }

    fn write_headers_frames(&mut self, stream_id: u32, block: &[u8], end_stream: bool) -> Result<(), Http2ConnectionError> {
        let max_frame = (self.control.peer.max_frame_size as usize).max(1);
        if block.is_empty() {
            let mut frame_flags = flags::END_HEADERS;
            if end_stream {
                frame_flags |= flags::END_STREAM;
            }
            let mut out = Vec::new();
            FrameHeader::write_frame(FrameType::Headers, frame_flags, stream_id, &[], &mut out);
            return self.write_fully(&out);
        }
        let mut offset = 0usize;
        let mut first = true;
        while offset < block.len() {
            let end = (offset + max_frame).min(block.len());
            let is_last = end == block.len();
            let mut frame_flags = 0;
            if first && end_stream {
                frame_flags |= flags::END_STREAM;
            }
            if is_last {
                frame_flags |= flags::END_HEADERS;
            }
            let frame_type = if first { FrameType::Headers } else { FrameType::Continuation };
            let mut out = Vec::new();
            FrameHeader::write_frame(frame_type, frame_flags, stream_id, &block[offset..end], &mut out);
            self.write_fully(&out)?;
            offset = end;
            first = false;
        }
        Ok(())
    }

    fn drain_all_backlogs(&mut self) {
        let ids: Vec<u32> = self.streams.iter().filter(|(_, s)| s.has_backlog()).map(|(id, _)| *id).collect();
        for id in ids {
            self.drain_backlog(id);
        }
    }

    fn drain_backlog(&mut self, stream_id: u32) {
        loop {
            let ready = self.streams.get(&stream_id).map(|s| s.has_backlog() && !s.is_paused()).unwrap_or(false);
            if !ready {
                break;
            }
            let data = self.streams.get_mut(&stream_id).and_then(|s| s.pop_backlog_data());
            if let Some((bytes, end_stream)) = data {
                match self.write_data_now(stream_id, bytes.clone(), end_stream) {
                    Ok(true) => self.dispatch_event(stream_id, MessageStreamEvent::DataFlushed),
                    Ok(false) => break,
                    Err(_) => break,
                }
                continue;
            }
            let trailers = self.streams.get_mut(&stream_id).and_then(|s| s.pop_backlog_trailers());
            if let Some(trailers) = trailers {
                let _ = self.send_trailers(stream_id, trailers);
                continue;
            }
            break;
        }
    }

    // ---- socket plumbing / the DoS guard --------------------------------

    /// Writes a frame that is never backlogged (control-plane traffic):
    /// treats a partial or refused write as connection-fatal, since these
    /// frames can't be meaningfully retried later.
    fn write_fully(&mut self, bytes: &[u8]) -> Result<(), Http2ConnectionError> {
        if self.write_out(bytes)? {
            Ok(())
        } else {
            Err(Http2ConnectionError::connection(ErrorCode::InternalError, "socket refused a control-plane frame"))
        }
    }

    /// Returns `Ok(true)` if `bytes` went out in full, `Ok(false)` if the
    /// socket is applying backpressure (caller should queue and retry
    /// later), or `Err` once `unwritable_error_threshold` consecutive
    /// failures have tripped the DoS guard (spec §4.L) and the connection
    /// has been torn down.
    fn write_out(&mut self, bytes: &[u8]) -> Result<bool, Http2ConnectionError> {
        if bytes.is_empty() {
            return Ok(true);
        }
        if !self.socket.is_connected() {
            return Err(Http2ConnectionError::connection(ErrorCode::InternalError, "socket is no longer connected"));
        }
        if !self.socket.is_writable() {
            return self.note_unwritable();
        }
        match self.socket.write(bytes) {
            Ok(n) if n == bytes.len() => {
                self.consecutive_unwritable_errors = 0;
                Ok(true)
            }
            Ok(_) => self.note_unwritable(),
            Err(_) => self.note_unwritable(),
        }
    }

    fn note_unwritable(&mut self) -> Result<bool, Http2ConnectionError> {
        self.consecutive_unwritable_errors += 1;
        if self.consecutive_unwritable_errors > self.limits.unwritable_error_threshold {
            self.socket.close();
            self.closed = true;
            return Err(Http2ConnectionError::connection(
                ErrorCode::EnhanceYourCalm,
                "too many consecutive unwritable writes, closing the connection",
            ));
        }
        Ok(false)
    }

    fn fail_connection(&mut self, code: ErrorCode, message: &str) -> Result<(), Http2ConnectionError> {
        self.fail_connection_with(Http2ConnectionError::connection(code, message.to_string()))
    }

    fn fail_connection_with(&mut self, err: Http2ConnectionError) -> Result<(), Http2ConnectionError> {
        if !self.closed {
            let debug = err.message.as_deref().unwrap_or("").as_bytes().to_vec();
            let goaway = self.control.build_goaway(self.highest_peer_stream_id, err.code, &debug);
            let _ = self.write_out(&goaway);
            self.socket.close();
            self.closed = true;
            vellum_core::log_error!(code = %err.code, "closing http/2 connection");
        }
        Err(err)
    }
}

fn strip_padding_only(payload: &[u8], frame_flags: u8) -> Result<&[u8], Http2ConnectionError> {
    if frame_flags & flags::PADDED == 0 {
        return Ok(payload);
    }
    let Some(&pad_len) = payload.first() else {
        return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "PADDED frame too short for its pad length byte"));
    };
    let body = &payload[1..];
    if body.len() < pad_len as usize {
        return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "pad length exceeds the frame payload"));
    }
    Ok(&body[..body.len() - pad_len as usize])
}

fn strip_padding_and_priority(payload: &[u8], frame_flags: u8) -> Result<Vec<u8>, Http2ConnectionError> {
    let mut rest = payload;
    let mut pad_len = 0usize;
    if frame_flags & flags::PADDED != 0 {
        let Some(&p) = rest.first() else {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "PADDED HEADERS too short for its pad length byte"));
        };
        pad_len = p as usize;
        rest = &rest[1..];
    }
    if frame_flags & flags::PRIORITY != 0 {
        if rest.len() < 5 {
            return Err(Http2ConnectionError::connection(ErrorCode::FrameSizeError, "PRIORITY-flagged HEADERS too short for its priority fields"));
        }
        rest = &rest[5..];
    }
    if rest.len() < pad_len {
        return Err(Http2ConnectionError::connection(ErrorCode::ProtocolError, "pad length exceeds the frame payload"));
    }
    Ok(rest[..rest.len() - pad_len].to_vec())
}

fn build_request_header_block(request: &Request) -> HeaderMap {
    let mut h = HeaderMap::new();
    let _ = h.add(":method", request.method());
    let _ = h.add(":scheme", request.scheme().as_str());
    if let Some(authority) = request.authority() {
        let _ = h.add(":authority", authority);
    }
    let _ = h.add(":path", request.path());
    for (name, value) in request.common().headers().iter() {
        let _ = h.add(name, value);
    }
    h
}

fn build_response_header_block(response: &Response) -> HeaderMap {
    let mut h = HeaderMap::new();
    let _ = h.add(":status", response.status().to_string());
    for (name, value) in response.common().headers().iter() {
        let _ = h.add(name, value);
    }
    h
}

fn parse_request(headers: HeaderMap, version: HttpVersion, stream_id: u32) -> Result<Request, Http2ConnectionError> {
    let bad = |msg: &str| Http2ConnectionError::stream(stream_id, ErrorCode::ProtocolError, msg.to_string());
    let method = headers.get_first(":method").ok_or_else(|| bad("missing :method pseudo-header"))?.to_string();
    let scheme: Scheme = headers
        .get_first(":scheme")
        .ok_or_else(|| bad("missing :scheme pseudo-header"))?
        .parse()
        .map_err(|_| bad("unrecognized :scheme value"))?;
    let path = headers.get_first(":path").ok_or_else(|| bad("missing :path pseudo-header"))?.to_string();
    let authority = headers.get_first(":authority").map(str::to_string);

    let mut request = Request::new(version, method, scheme, path).map_err(|e| bad(&e.to_string()))?;
    request.set_authority(authority).expect("a freshly built request is never locked");
    for (name, value) in headers.iter() {
        if !name.starts_with(':') {
            let _ = request.common_mut().headers_mut().add(name, value);
        }
    }
    Ok(request)
}

fn parse_response(headers: HeaderMap, version: HttpVersion, stream_id: u32) -> Result<Response, Http2ConnectionError> {
    let bad = |msg: &str| Http2ConnectionError::stream(stream_id, ErrorCode::ProtocolError, msg.to_string());
    let status: u16 = headers
        .get_first(":status")
        .ok_or_else(|| bad("missing :status pseudo-header"))?
        .parse()
        .map_err(|_| bad("malformed :status pseudo-header"))?;
    let mut response = Response::new(version, status);
    for (name, value) in headers.iter() {
        if !name.starts_with(':') {
            let _ = response.common_mut().headers_mut().add(name, value);
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::BufferedSocket;

    struct EchoHandler;
    impl<S: WritableSocket> EndpointHandler<S> for EchoHandler {
        fn on_new_stream(&mut self, _ctx: &mut StreamContext<'_, S>) -> Box<dyn MessageStreamHandler<S>> {
            Box::new(NullStreamHandler)
        }
    }

    struct NullStreamHandler;
    impl<S: WritableSocket> MessageStreamHandler<S> for NullStreamHandler {
        fn handle(&mut self, _ctx: &mut StreamContext<'_, S>, _event: MessageStreamEvent) {}
    }

    fn new_client() -> Endpoint<BufferedSocket<Vec<u8>>> {
        let socket = BufferedSocket::new(Vec::new(), "test");
        Endpoint::new_client(socket, EndpointLimits::new(), Box::new(EchoHandler)).unwrap()
    }

    fn new_server() -> Endpoint<BufferedSocket<Vec<u8>>> {
        let socket = BufferedSocket::new(Vec::new(), "test");
        Endpoint::new_server(socket, EndpointLimits::new(), Box::new(EchoHandler)).unwrap()
    }

    #[test]
    fn client_construction_sends_preface_then_settings() {
        let client = new_client();
        let written = client.socket.get_ref();
        assert_eq!(&written[..super::super::PREFACE.len()], super::super::PREFACE);
    }

    #[test]
    fn server_rejects_receive_before_preface_completes() {
        let mut server = new_server();
        assert!(server.receive(b"PRI * HTTP/2.0\r\n\r\n").is_ok());
        assert!(!server.preface_consumed);
    }

    #[test]
    fn server_accepts_a_well_formed_preface_and_settings_frame() {
        let mut server = new_server();
        let mut input = super::super::PREFACE.to_vec();
        FrameHeader::write_frame(FrameType::Settings, 0, 0, &[], &mut input);
        assert!(server.receive(&input).is_ok());
        assert!(server.preface_consumed);
    }

    #[test]
    fn create_request_stream_advances_odd_ids() {
        let mut client = new_client();
        let req = Request::new(HttpVersion::Http2, "GET", Scheme::Https, "/").unwrap();
        let id1 = client.create_request_stream(req, true).unwrap();
        let req2 = Request::new(HttpVersion::Http2, "GET", Scheme::Https, "/other").unwrap();
        let id2 = client.create_request_stream(req2, true).unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 3);
    }

    #[test]
    fn request_stream_half_closes_locally_once_end_stream_sent() {
        let mut client = new_client();
        let req = Request::new(HttpVersion::Http2, "GET", Scheme::Https, "/").unwrap();
        let id = client.create_request_stream(req, true).unwrap();
        assert_eq!(client.stream(id).unwrap().state(), StreamState::HalfClosedLocal);
    }

    #[test]
    fn send_data_writes_only_what_the_window_allows_and_queues_the_rest() {
        let limits = EndpointLimits { initial_window_size: 5, ..EndpointLimits::new() };
        let socket = BufferedSocket::new(Vec::new(), "test");
        let mut client = Endpoint::new_client(socket, limits, Box::new(EchoHandler)).unwrap();
        let req = Request::new(HttpVersion::Http2, "GET", Scheme::Https, "/").unwrap();
        let id = client.create_request_stream(req, false).unwrap();

        let before = client.socket.get_ref().len();
        let flushed = client.send_data(id, Bytes::from_static(b"hello world"), true).unwrap();
        assert!(!flushed);

        let written = &client.socket.get_ref()[before..];
        assert_eq!(written.len(), FRAME_HEADER_LEN + 5);
        assert_eq!(&written[FRAME_HEADER_LEN..], b"hello");
        assert!(client.stream(id).unwrap().has_backlog());
    }

    #[test]
    fn resuming_sends_a_window_update_restoring_initial_window_size() {
        let mut client = new_client();
        let stream_id = 99;
        client.streams.insert(stream_id, MessageStream::new(stream_id, false, StreamState::Open, 65_535));
        client.streams.get_mut(&stream_id).unwrap().pause();

        let before = client.socket.get_ref().len();
        {
            let mut ctx = StreamContext { endpoint: &mut client, stream_id };
            ctx.resume();
        }
        let written = &client.socket.get_ref()[before..];
        assert_eq!(written.len(), FRAME_HEADER_LEN + 4);
        let increment = u32::from_be_bytes([written[FRAME_HEADER_LEN], written[FRAME_HEADER_LEN + 1], written[FRAME_HEADER_LEN + 2], written[FRAME_HEADER_LEN + 3]]);
        assert_eq!(increment, client.control.local.initial_window_size);
        assert!(!client.stream(stream_id).unwrap().is_paused());
    }

    #[test]
    fn paused_stream_gets_no_stream_level_window_update_on_data() {
        let mut server = new_server();
        let stream_id = 1;
        server.streams.insert(stream_id, MessageStream::new(stream_id, false, StreamState::Open, 65_535));
        server.streams.get_mut(&stream_id).unwrap().pause();

        let mut raw_bytes = Vec::new();
        FrameHeader::write_frame(FrameType::Data, 0, stream_id, b"hi", &mut raw_bytes);
        let (raw, _) = FrameHeader::decode(&raw_bytes[..FRAME_HEADER_LEN]);

        let before = server.socket.get_ref().len();
        server.handle_data(raw, b"hi").unwrap();
        let written = &server.socket.get_ref()[before..];
        // only the connection-level WINDOW_UPDATE; the paused stream gets none.
        assert_eq!(written.len(), FRAME_HEADER_LEN + 4);
    }
}
