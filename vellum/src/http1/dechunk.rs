//! Body extraction for HTTP/1 messages: `Content-Length`-delimited,
//! chunked-transfer, or bodyless.

use bytes::Bytes;
use vellum_core::Http1Error;

/// Output buffer size: a single inbound chunk larger than this is split
/// across multiple `addData` callback invocations.
const OUTPUT_CHUNK: usize = 16 * 1024;

/// How a [`Dechunker`] locates the end of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body at all — ends immediately.
    None,
    /// Exactly `remaining` more bytes, then end.
    ContentLength { remaining: u64 },
    /// `<hex-size>[;ext]CRLF<data>CRLF` repeated until a zero-sized chunk.
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    /// Reading the `<hex-size>[;ext]CRLF` line; buffers a handful of bytes
    /// until the terminating LF shows up.
    ReadingSize,
    /// Copying `remaining` data bytes of the current chunk straight
    /// through.
    ReadingData { remaining: u64 },
    /// Consuming the CRLF that follows a chunk's data.
    ReadingTrailingCrlf,
    /// Past the zero-size chunk line, reading trailer header lines (if
    /// any) up to the terminating empty line.
    ReadingTrailers,
    Done,
}

/// Maximum bytes buffered while waiting for a chunk-size line's LF. Real
/// chunk-size lines are a handful of hex digits plus optional extensions;
/// anything beyond this is almost certainly not a chunk-size line at all.
const MAX_SIZE_LINE: usize = 64;

pub struct Dechunker {
    mode: BodyMode,
    chunk_state: ChunkState,
    size_line: Vec<u8>,
    done: bool,
}

impl Dechunker {
    pub fn new(mode: BodyMode) -> Self {
        let done = matches!(mode, BodyMode::None) || matches!(mode, BodyMode::ContentLength { remaining: 0 });
        Self { mode, chunk_state: ChunkState::ReadingSize, size_line: Vec::new(), done }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed inbound bytes. Invokes `emit` zero or more times with body
    /// data, each call no larger than [`OUTPUT_CHUNK`]; a final call with
    /// an empty slice signals end-of-body. Returns the number of bytes of
    /// `buf` consumed.
    pub fn add_data(&mut self, buf: &[u8], mut emit: impl FnMut(&[u8])) -> Result<usize, Http1Error> {
        if self.done {
            if buf.is_empty() {
                return Ok(0);
            }
            return Err(Http1Error::DataAfterEnd);
        }

        match self.mode {
            BodyMode::None => {
                self.done = true;
                emit(&[]);
                Ok(0)
            }
            BodyMode::ContentLength { ref mut remaining } => {
                let take = (*remaining).min(buf.len() as u64) as usize;
                for piece in buf[..take].chunks(OUTPUT_CHUNK) {
                    emit(piece);
                }
                *remaining -= take as u64;
                if *remaining == 0 {
                    self.done = true;
                    emit(&[]);
                }
                if take < buf.len() {
                    return Err(Http1Error::LengthMismatch);
                }
                Ok(take)
            }
            BodyMode::Chunked => self.add_chunked(buf, &mut emit),
        }
    }

    fn add_chunked(&mut self, buf: &[u8], emit: &mut dyn FnMut(&[u8])) -> Result<usize, Http1Error> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.chunk_state {
                ChunkState::Done => return Err(Http1Error::DataAfterEnd),
                ChunkState::ReadingSize => {
                    let Some(nl) = buf[offset..].iter().position(|&b| b == b'\n') else {
                        let tail = &buf[offset..];
                        if self.size_line.len() + tail.len() > MAX_SIZE_LINE {
                            return Err(Http1Error::InvalidChunkSize);
                        }
                        self.size_line.extend_from_slice(tail);
                        return Ok(buf.len());
                    };
                    let mut line = std::mem::take(&mut self.size_line);
                    line.extend_from_slice(&buf[offset..offset + nl]);
                    offset += nl + 1;
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    let size_str = std::str::from_utf8(&line).map_err(|_| Http1Error::InvalidChunkSize)?;
                    let size_str = size_str.split(';').next().unwrap_or("").trim();
                    let size = u64::from_str_radix(size_str, 16).map_err(|_| Http1Error::InvalidChunkSize)?;
                    if size == 0 {
                        self.chunk_state = ChunkState::ReadingTrailers;
                    } else {
                        self.chunk_state = ChunkState::ReadingData { remaining: size };
                    }
                }
                ChunkState::ReadingData { remaining } => {
                    let available = (buf.len() - offset) as u64;
                    let take = remaining.min(available) as usize;
                    for piece in buf[offset..offset + take].chunks(OUTPUT_CHUNK) {
                        emit(piece);
                    }
                    offset += take;
                    let left = remaining - take as u64;
                    self.chunk_state =
                        if left == 0 { ChunkState::ReadingTrailingCrlf } else { ChunkState::ReadingData { remaining: left } };
                }
                ChunkState::ReadingTrailingCrlf => {
                    // Tolerate a bare LF as well as CRLF, consistent with
                    // the header-line scanner.
                    let b = buf[offset];
                    offset += 1;
                    if b == b'\r' {
                        continue;
                    }
                    if b == b'\n' {
                        self.chunk_state = ChunkState::ReadingSize;
                        continue;
                    }
                    return Err(Http1Error::InvalidChunkSize);
                }
                ChunkState::ReadingTrailers => {
                    let Some(nl) = buf[offset..].iter().position(|&b| b == b'\n') else {
                        let tail = &buf[offset..];
                        if self.size_line.len() + tail.len() > MAX_SIZE_LINE {
                            return Err(Http1Error::InvalidChunkSize);
                        }
                        self.size_line.extend_from_slice(tail);
                        return Ok(buf.len());
                    };
                    let mut line = std::mem::take(&mut self.size_line);
                    line.extend_from_slice(&buf[offset..offset + nl]);
                    offset += nl + 1;
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        self.chunk_state = ChunkState::Done;
                        self.done = true;
                        emit(&[]);
                    }
                    // A non-empty line is a trailer header; discarded, since
                    // nothing downstream of the dechunker consumes trailers
                    // delivered this way. Stay in `ReadingTrailers`.
                }
            }
        }
        Ok(offset)
    }
}

/// Picks the dechunk mode for a received message from its headers and
/// whether it is permitted a body at all (responses consult
/// [`crate::message::Response::is_bodyless`] first).
pub fn mode_for_headers(headers: &crate::header::HeaderMap, bodyless: bool) -> BodyMode {
    if bodyless {
        return BodyMode::None;
    }
    if headers.get_first("transfer-encoding").map(|v| v.eq_ignore_ascii_case("chunked")).unwrap_or(false) {
        return BodyMode::Chunked;
    }
    match headers.get_first("content-length").and_then(|v| v.parse::<u64>().ok()) {
        Some(len) => BodyMode::ContentLength { remaining: len },
        None => BodyMode::None,
    }
}

/// Collects dechunked output into an owned buffer; a thin convenience
/// wrapper for callers that don't need streaming emission.
pub fn collect_body(dechunker: &mut Dechunker, buf: &[u8]) -> Result<(Bytes, usize), Http1Error> {
    let mut out = Vec::new();
    let consumed = dechunker.add_data(buf, |piece| out.extend_from_slice(piece))?;
    Ok((Bytes::from(out), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_body_emits_data_then_empty_terminator() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        let mut pieces = Vec::new();
        d.add_data(b"5\r\nhello\r\n0\r\n\r\n", |p| pieces.push(p.to_vec())).unwrap();
        assert_eq!(pieces, vec![b"hello".to_vec(), Vec::new()]);
        assert!(d.is_done());
    }

    #[test]
    fn chunked_body_split_across_many_calls() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        let mut out = Vec::new();
        for byte in b"5\r\nhello\r\n0\r\n\r\n" {
            d.add_data(&[*byte], |p| out.extend_from_slice(p)).unwrap();
        }
        assert_eq!(out, b"hello");
        assert!(d.is_done());
    }

    #[test]
    fn content_length_body_ends_at_declared_count() {
        let mut d = Dechunker::new(BodyMode::ContentLength { remaining: 5 });
        let mut pieces = Vec::new();
        d.add_data(b"hello", |p| pieces.push(p.to_vec())).unwrap();
        assert_eq!(pieces, vec![b"hello".to_vec(), Vec::new()]);
        assert!(d.is_done());
    }

    #[test]
    fn content_length_body_rejects_excess_bytes() {
        let mut d = Dechunker::new(BodyMode::ContentLength { remaining: 3 });
        let mut pieces = Vec::new();
        let err = d.add_data(b"hello", |p| pieces.push(p.to_vec())).unwrap_err();
        assert!(matches!(err, Http1Error::LengthMismatch));
    }

    #[test]
    fn data_after_end_is_rejected() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        d.add_data(b"0\r\n\r\n", |_| {}).unwrap();
        let err = d.add_data(b"more", |_| {}).unwrap_err();
        assert!(matches!(err, Http1Error::DataAfterEnd));
    }

    #[test]
    fn malformed_chunk_size_is_rejected() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        let err = d.add_data(b"zz\r\n", |_| {}).unwrap_err();
        assert!(matches!(err, Http1Error::InvalidChunkSize));
    }

    #[test]
    fn large_chunk_splits_across_output_buffer_boundary() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        let body = vec![b'a'; OUTPUT_CHUNK + 10];
        let mut msg = format!("{:x}\r\n", body.len()).into_bytes();
        msg.extend_from_slice(&body);
        msg.extend_from_slice(b"\r\n0\r\n\r\n");
        let mut pieces = Vec::new();
        d.add_data(&msg, |p| pieces.push(p.len())).unwrap();
        assert_eq!(pieces, vec![OUTPUT_CHUNK, 10, 0]);
    }

    #[test]
    fn trailer_headers_after_the_last_chunk_are_consumed_before_done() {
        let mut d = Dechunker::new(BodyMode::Chunked);
        let mut pieces = Vec::new();
        d.add_data(b"5\r\nhello\r\n0\r\nx-trailer: value\r\n\r\n", |p| pieces.push(p.to_vec())).unwrap();
        assert_eq!(pieces, vec![b"hello".to_vec(), Vec::new()]);
        assert!(d.is_done());
        // bytes arriving after the terminator are still rejected.
        let mut d = Dechunker::new(BodyMode::Chunked);
        d.add_data(b"5\r\nhello\r\n0\r\nx-trailer: value\r\n\r\n", |_| {}).unwrap();
        assert!(matches!(d.add_data(b"x", |_| {}), Err(Http1Error::DataAfterEnd)));
    }

    #[test]
    fn none_mode_ends_immediately_with_zero_bytes() {
        let mut d = Dechunker::new(BodyMode::None);
        assert!(d.is_done());
        let mut called = false;
        d.add_data(&[], |p| {
            called = true;
            assert!(p.is_empty());
        })
        .unwrap();
        assert!(!called);
    }
}
