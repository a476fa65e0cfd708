//! HTTP/1.x framing: header parsing, start-line assembly, serialization,
//! and chunked/length-delimited body extraction.

pub mod dechunk;
pub mod receiver;
pub mod transmitter;

pub use dechunk::{BodyMode, Dechunker};
pub use receiver::{Http1Receiver, ReceiveOutcome, RequestReceiver, ResponseReceiver};
pub use transmitter::serialize_request;
pub use transmitter::serialize_response;
