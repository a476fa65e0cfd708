//! Header-block encode/decode (RFC 7541 §6): the five representations
//! (indexed, literal-with-incremental-indexing, literal-without-indexing,
//! literal-never-indexed, dynamic-table-size-update), combined static +
//! dynamic table indexing, and the `cookie` re-folding HTTP/2 mandates on
//! decode so the application sees one header instead of N (RFC 7540
//! §8.1.2.5).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::header::HeaderMap;

use super::table::{self, DynamicTable, STATIC_TABLE_LEN};
use super::{integer, string, HpackError};

/// Header names a session has decided must never be re-indexed into a
/// dynamic table, even if a peer's literal tries to. Shared across every
/// `Encoder`/`Decoder` built from the same [`Session`] (spec §3: "shared
/// across both directions of a single session and is thread-safe").
#[derive(Clone, Default)]
pub struct NeverIndexSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl NeverIndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, name: &str) {
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(name.to_ascii_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        let set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(name)
    }
}

/// Owns the shared never-index set a connection's encoder and decoder (and,
/// per spec, any other connection that wants the same confidentiality
/// guarantee) are built from.
#[derive(Clone, Default)]
pub struct Session {
    never_index: NeverIndexSet,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn never_index(&self) -> NeverIndexSet {
        self.never_index.clone()
    }

    pub fn new_encoder(&self, settings_ceiling: u32) -> Encoder {
        Encoder::new(self.never_index.clone(), settings_ceiling)
    }

    pub fn new_decoder(&self, settings_ceiling: u32) -> Decoder {
        Decoder::new(self.never_index.clone(), settings_ceiling)
    }
}

fn combined_exact_match(table: &DynamicTable, name: &str, value: &str) -> Option<usize> {
    table::static_exact_match(name, value).or_else(|| table.exact_match(name, value).map(|i| i + STATIC_TABLE_LEN))
}

fn combined_name_match(table: &DynamicTable, name: &str) -> Option<usize> {
    table::static_name_match(name).or_else(|| table.name_match(name).map(|i| i + STATIC_TABLE_LEN))
}

fn lookup_full(table: &DynamicTable, index: usize) -> Result<(String, String), HpackError> {
    if index == 0 {
        return Err(HpackError::InvalidIndex(0));
    }
    if index <= STATIC_TABLE_LEN {
        let (name, value) = table::static_entry(index).ok_or(HpackError::InvalidIndex(index))?;
        return Ok((name.to_string(), value.to_string()));
    }
    let (name, value) = table.get(index - STATIC_TABLE_LEN).ok_or(HpackError::InvalidIndex(index))?;
    Ok((name.to_string(), value.to_string()))
}

fn lookup_name_only(table: &DynamicTable, index: usize) -> Result<String, HpackError> {
    lookup_full(table, index).map(|(name, _)| name)
}

/// Encodes `HeaderMap`s into HPACK header-block fragments, maintaining the
/// encoder-side half of the dynamic table.
pub struct Encoder {
    table: DynamicTable,
    never_index: NeverIndexSet,
    /// Set when the caller lowers the current cap below the settings
    /// ceiling; the next `encode` call emits a Dynamic Table Size Update
    /// before any header (spec §4.G).
    pending_size_update: Option<u32>,
}

impl Encoder {
    pub fn new(never_index: NeverIndexSet, settings_ceiling: u32) -> Self {
        Self { table: DynamicTable::new(settings_ceiling), never_index, pending_size_update: None }
    }

    pub fn set_settings_ceiling(&mut self, ceiling: u32) {
        self.table.set_settings_ceiling(ceiling);
    }

    /// Lowers (or raises, up to the settings ceiling) the table's current
    /// cap. Queues an in-band Dynamic Table Size Update for the next
    /// `encode` call.
    pub fn set_table_size(&mut self, cap: u32) -> Result<(), HpackError> {
        self.table.set_current_cap(cap)?;
        self.pending_size_update = Some(cap);
        Ok(())
    }

    pub fn encode(&mut self, headers: &HeaderMap) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(cap) = self.pending_size_update.take() {
            let mut bytes = integer::encode(cap as u64, 5);
            bytes[0] |= 0x20;
            out.extend(bytes);
        }
        for (name, value) in headers.iter() {
            self.encode_header(name, value, &mut out);
        }
        out
    }

    fn encode_header(&mut self, name: &str, value: &str, out: &mut Vec<u8>) {
        if let Some(idx) = combined_exact_match(&self.table, name, value) {
            let mut bytes = integer::encode(idx as u64, 7);
            bytes[0] |= 0x80;
            out.extend(bytes);
            return;
        }

        let never = self.never_index.contains(name);
        match combined_name_match(&self.table, name) {
            Some(idx) => {
                if never {
                    let mut bytes = integer::encode(idx as u64, 4);
                    bytes[0] |= 0x10;
                    out.extend(bytes);
                } else {
                    let mut bytes = integer::encode(idx as u64, 6);
                    bytes[0] |= 0x40;
                    out.extend(bytes);
                    self.table.insert(name.to_string(), value.to_string());
                }
            }
            None => {
                out.push(if never { 0x10 } else { 0x40 });
                out.extend(string::encode(name));
                if !never {
                    self.table.insert(name.to_string(), value.to_string());
                }
            }
        }
        out.extend(string::encode(value));
    }
}

/// Decodes HPACK header-block fragments, maintaining the decoder-side half
/// of the dynamic table.
pub struct Decoder {
    table: DynamicTable,
    never_index: NeverIndexSet,
}

impl Decoder {
    pub fn new(never_index: NeverIndexSet, settings_ceiling: u32) -> Self {
        Self { table: DynamicTable::new(settings_ceiling), never_index }
    }

    pub fn set_settings_ceiling(&mut self, ceiling: u32) {
        self.table.set_settings_ceiling(ceiling);
    }

    pub fn table_size(&self) -> u32 {
        self.table.current_cap()
    }

    pub fn decode(&mut self, buf: &[u8]) -> Result<HeaderMap, HpackError> {
        let mut headers = HeaderMap::new();
        let mut i = 0;
        while i < buf.len() {
            let byte = buf[i];
            if byte & 0x80 != 0 {
                let (idx, n) = integer::decode(&buf[i..], 7)?;
                i += n;
                let (name, value) = lookup_full(&self.table, idx as usize)?;
                push_header(&mut headers, name, value);
            } else if byte & 0x40 != 0 {
                let (idx, n) = integer::decode(&buf[i..], 6)?;
                i += n;
                let (name, name_len) = self.read_name(idx as usize, &buf[i..])?;
                i += name_len;
                let (value, value_len) = string::decode(&buf[i..])?;
                i += value_len;
                if !self.never_index.contains(&name) {
                    self.table.insert(name.clone(), value.clone());
                }
                push_header(&mut headers, name, value);
            } else if byte & 0x20 != 0 {
                let (cap, n) = integer::decode(&buf[i..], 5)?;
                i += n;
                self.table.set_current_cap(cap as u32)?;
            } else if byte & 0x10 != 0 {
                let (idx, n) = integer::decode(&buf[i..], 4)?;
                i += n;
                let (name, name_len) = self.read_name(idx as usize, &buf[i..])?;
                i += name_len;
                let (value, value_len) = string::decode(&buf[i..])?;
                i += value_len;
                self.never_index.mark(&name);
                push_header(&mut headers, name, value);
            } else {
                let (idx, n) = integer::decode(&buf[i..], 4)?;
                i += n;
                let (name, name_len) = self.read_name(idx as usize, &buf[i..])?;
                i += name_len;
                let (value, value_len) = string::decode(&buf[i..])?;
                i += value_len;
                push_header(&mut headers, name, value);
            }
        }
        Ok(headers)
    }

    /// Resolves a literal representation's name field: `index == 0` means a
    /// string literal follows; otherwise it's a reference into the
    /// combined static+dynamic table. Returns `(name, bytes_consumed)`
    /// where `bytes_consumed` only counts the trailing string literal (the
    /// index itself was already consumed by the caller).
    fn read_name(&self, index: usize, rest: &[u8]) -> Result<(String, usize), HpackError> {
        if index == 0 {
            let (name, n) = string::decode(rest)?;
            Ok((name, n))
        } else {
            Ok((lookup_name_only(&self.table, index)?, 0))
        }
    }
}

fn push_header(headers: &mut HeaderMap, name: String, value: String) {
    if name.eq_ignore_ascii_case("cookie") && headers.count("cookie") > 0 {
        headers.append_with_separator("cookie", &value, "; ").expect("fresh HeaderMap is never locked");
    } else {
        headers.add(&name, value).expect("fresh HeaderMap is never locked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (n, v) in pairs {
            h.add(*n, *v).unwrap();
        }
        h
    }

    #[test]
    fn static_exact_match_emits_single_indexed_byte() {
        // S4: {:method=GET} is static index 2.
        let session = Session::new();
        let mut enc = session.new_encoder(4096);
        let out = enc.encode(&headers(&[(":method", "GET")]));
        assert_eq!(out, vec![0x82]);
    }

    #[test]
    fn encode_decode_round_trip_preserves_header_multiset() {
        let enc_session = Session::new();
        let dec_session = Session::new();
        let mut enc = enc_session.new_encoder(4096);
        let mut dec = dec_session.new_decoder(4096);

        let input = headers(&[(":method", "GET"), (":path", "/a/b"), ("x-custom", "value-one")]);
        let block = enc.encode(&input);
        let decoded = dec.decode(&block).unwrap();

        assert_eq!(decoded.get_first(":method"), Some("GET"));
        assert_eq!(decoded.get_first(":path"), Some("/a/b"));
        assert_eq!(decoded.get_first("x-custom"), Some("value-one"));
    }

    #[test]
    fn repeated_header_gets_indexed_on_second_encode() {
        let session = Session::new();
        let mut enc = session.new_encoder(4096);
        let h = headers(&[("x-custom", "value-one")]);
        let first = enc.encode(&h);
        let second = enc.encode(&h);
        // First occurrence: literal w/ incremental indexing (0x40 prefix).
        assert_eq!(first[0] & 0xc0, 0x40);
        // Second occurrence: now in the dynamic table, so fully indexed.
        assert_eq!(second[0] & 0x80, 0x80);
    }

    #[test]
    fn multiple_cookie_headers_are_refolded_on_decode() {
        let session = Session::new();
        let mut enc = session.new_encoder(4096);
        let mut dec = session.new_decoder(4096);
        let input = headers(&[("cookie", "a=1"), ("cookie", "b=2")]);
        let block = enc.encode(&input);
        let decoded = dec.decode(&block).unwrap();
        assert_eq!(decoded.count("cookie"), 1);
        assert_eq!(decoded.get_first("cookie"), Some("a=1; b=2"));
    }

    #[test]
    fn never_indexed_name_is_never_reinserted_into_the_table() {
        let session = Session::new();
        session.never_index().mark("authorization");
        let mut enc = session.new_encoder(4096);
        let h = headers(&[("authorization", "secret")]);
        let out = enc.encode(&h);
        // Literal never indexed: 0001xxxx.
        assert_eq!(out[0] & 0xf0, 0x10);
        let out2 = enc.encode(&h);
        // Still never indexed the second time — it was never added.
        assert_eq!(out2[0] & 0xf0, 0x10);
    }

    #[test]
    fn decoder_enforces_never_index_even_if_peer_indexes_it() {
        let session = Session::new();
        session.never_index().mark("x-secret");
        let mut dec = session.new_decoder(4096);
        // Hand-construct a literal-with-incremental-indexing block for a
        // never-indexed name, as a non-conforming peer might.
        let mut block = vec![0x40];
        block.extend(string::encode("x-secret"));
        block.extend(string::encode("v1"));
        dec.decode(&block).unwrap();
        // Because the name was marked never-index, it must not have been
        // inserted: a second reference by combined index must fail.
        assert!(dec.table.get(1).is_none());
    }

    #[test]
    fn dynamic_table_size_update_is_emitted_before_headers() {
        let session = Session::new();
        let mut enc = session.new_encoder(4096);
        enc.set_table_size(100).unwrap();
        let out = enc.encode(&headers(&[(":method", "GET")]));
        assert_eq!(out[0] & 0xe0, 0x20);
    }

    #[test]
    fn size_update_exceeding_settings_ceiling_is_rejected() {
        let session = Session::new();
        let mut dec = session.new_decoder(100);
        let mut bytes = integer::encode(200, 5);
        bytes[0] |= 0x20;
        assert!(matches!(dec.decode(&bytes), Err(HpackError::TableSizeExceedsSettings { .. })));
    }

    #[test]
    fn invalid_index_zero_on_indexed_field_is_rejected() {
        let session = Session::new();
        let mut dec = session.new_decoder(4096);
        assert!(matches!(dec.decode(&[0x80]), Err(HpackError::InvalidIndex(0))));
    }
}
