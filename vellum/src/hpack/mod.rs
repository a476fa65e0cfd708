//! HPACK header compression (RFC 7541): integer and string primitives,
//! the static/dynamic tables, Huffman coding, and the encoder/decoder
//! pair that share a never-index set per session.

mod codec;
mod huffman;
mod integer;
mod string;
mod table;

pub use codec::{Decoder, Encoder, NeverIndexSet, Session};
pub use table::DynamicTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HpackError {
    #[error("truncated hpack input")]
    Truncated,
    #[error("hpack integer encoding overflowed")]
    IntegerOverflow,
    #[error("hpack table index {0} is out of range")]
    InvalidIndex(usize),
    #[error("invalid huffman-coded string")]
    InvalidHuffman,
    #[error("header value is not valid utf-8")]
    Utf8,
    #[error("dynamic table size update to {requested} exceeds settings ceiling {ceiling}")]
    TableSizeExceedsSettings { requested: u32, ceiling: u32 },
}
