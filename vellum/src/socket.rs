//! The byte-sink abstraction the engine writes through (spec §4.A). The
//! core never opens a socket, negotiates TLS, or runs an event loop — it
//! only ever calls through this trait, which the embedder implements over
//! whatever transport it owns (a `TcpStream`, a TLS session, an in-memory
//! test double, ...).

use std::io;

/// A byte sink the engine writes frames/messages through.
///
/// `is_connected` means the underlying channel can still accept writes at
/// all; `is_writable` means a further write will not require growing a
/// local buffer beyond a sensible bound (i.e. the OS socket buffer has
/// room right now). The engine treats `is_writable() == false` as a signal
/// to queue rather than write, exactly like `MessageStream`'s DATA backlog
/// (spec §4.K).
pub trait WritableSocket {
    /// Write `buf` starting at the socket's current position. Implementors
    /// should attempt a full write; partial writes are reported via the
    /// returned count exactly as `std::io::Write::write` does.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    fn is_writable(&self) -> bool;

    /// Human-readable peer identity, for logging.
    fn remote_name(&self) -> String;

    fn close(&mut self);
}

impl<T: io::Write> WritableSocket for BufferedSocket<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        io::Write::write(&mut self.inner, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_writable(&self) -> bool {
        self.connected
    }

    fn remote_name(&self) -> String {
        self.remote_name.clone()
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

/// A minimal `WritableSocket` wrapper around anything implementing
/// `std::io::Write` (a `TcpStream`, a `Vec<u8>` in tests, ...). Treats
/// "writable" as synonymous with "connected" since `std::io::Write` itself
/// has no concept of partial backpressure.
pub struct BufferedSocket<T> {
    inner: T,
    remote_name: String,
    connected: bool,
}

impl<T> BufferedSocket<T> {
    pub fn new(inner: T, remote_name: impl Into<String>) -> Self {
        Self { inner, remote_name: remote_name.into(), connected: true }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
