//! A sans-I/O HTTP/2 engine (RFC 7540, RFC 7541): frame dispatch, the
//! per-stream state machine, HPACK-backed header exchange, flow control,
//! and the application-facing [`MessageStream`]/[`MessageStreamHandler`]
//! pair. Nothing in this module touches a socket directly — see
//! [`crate::socket::WritableSocket`].

pub mod control;
pub mod endpoint;
pub mod message_stream;
pub mod settings;
pub mod stream_base;

/// RFC 7540 §3.5: the client connection preface, sent before anything else
/// on a connection that starts in cleartext or after ALPN has negotiated
/// "h2". A server's `Endpoint::receive` consumes exactly these 24 bytes
/// before treating anything as a frame.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub use control::ControlStream;
pub use endpoint::{Endpoint, EndpointHandler, Role, StreamContext};
pub use message_stream::{MessageStream, MessageStreamEvent, MessageStreamHandler, StreamRole, StreamState};
pub use settings::{SettingId, SettingsValues};
pub use stream_base::FlowWindow;

pub use vellum_core::error::ErrorCode;
