//! A sans-I/O HTTP protocol engine: HTTP/1.x framing (RFC 7230) and
//! HTTP/2 framing with HPACK (RFC 7540, RFC 7541).
//!
//! This crate never opens a socket. It consumes byte slices handed to it
//! by the embedder, produces decoded messages and byte buffers to write
//! back out, and leaves TCP/TLS, event-loop integration, and ALPN
//! negotiation entirely to the caller. See [`socket::WritableSocket`] for
//! the one trait the embedder implements.

pub mod header;
pub mod message;
pub mod socket;
pub mod validate;

pub mod hpack;

pub mod frame;
pub mod h2;

pub mod http1;

pub use header::HeaderMap;
pub use message::{HttpVersion, Request, Response, Scheme};
pub use socket::WritableSocket;
