//! RFC 7541 Appendix B Huffman coding. The code table is loaded once from
//! an embedded resource file; encoding indexes straight into it, decoding
//! walks a trie built from it once at startup.

use std::sync::OnceLock;

/// Code word and bit length per symbol, 0..=255 plus the EOS pseudo-symbol
/// (256).
struct Codes {
    code: [u32; 257],
    bits: [u8; 257],
}

fn codes() -> &'static Codes {
    static CODES: OnceLock<Codes> = OnceLock::new();
    CODES.get_or_init(|| {
        let text = include_str!("../../resources/hpack_huffman.txt");
        let mut lines = text.lines();
        let header = lines.next().expect("resource has an INIT header");
        assert_eq!(header, "INIT 257");

        let mut code = [0u32; 257];
        let mut bits = [0u8; 257];
        let mut seen = 0;
        for line in lines {
            let mut fields = line.split('\t');
            let symbol: usize = fields.next().unwrap().parse().unwrap();
            let bit_len: u8 = fields.next().unwrap().parse().unwrap();
            let hex: u32 = u32::from_str_radix(fields.next().unwrap(), 16).unwrap();
            code[symbol] = hex;
            bits[symbol] = bit_len;
            seen += 1;
        }
        assert_eq!(seen, 257, "hpack huffman resource must list all 257 symbols");
        Codes { code, bits }
    })
}

#[derive(Default)]
struct Node {
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
    symbol: Option<u16>,
}

fn trie() -> &'static Node {
    static TRIE: OnceLock<Node> = OnceLock::new();
    TRIE.get_or_init(|| {
        let tables = codes();
        let mut root = Node::default();
        for symbol in 0..257 {
            let mut node = &mut root;
            let bit_len = tables.bits[symbol];
            let code = tables.code[symbol];
            for i in (0..bit_len).rev() {
                let bit = (code >> i) & 1;
                node = if bit == 0 {
                    node.left.get_or_insert_with(|| Box::new(Node::default()))
                } else {
                    node.right.get_or_insert_with(|| Box::new(Node::default()))
                };
            }
            node.symbol = Some(symbol as u16);
        }
        root
    })
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let tables = codes();
    let mut bit_buf: u64 = 0;
    let mut bit_count: u32 = 0;
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        let code = tables.code[byte as usize] as u64;
        let bit_len = tables.bits[byte as usize] as u32;
        bit_buf = (bit_buf << bit_len) | code;
        bit_count += bit_len;
        while bit_count >= 8 {
            bit_count -= 8;
            out.push(((bit_buf >> bit_count) & 0xff) as u8);
        }
    }
    if bit_count > 0 {
        // Pad the final partial byte with EOS's leading 1-bits, per RFC
        // 7541 §5.2.
        let pad = (1u64 << bit_count) - 1;
        bit_buf = (bit_buf << bit_count) | pad;
        out.push((bit_buf & 0xff) as u8);
    }
    out
}

/// `None` on any malformed input: an EOS symbol appearing before the
/// padding, a dead end in the trie, or trailing padding that isn't the
/// required run of 1-bits no longer than 7 bits.
pub fn decode(input: &[u8]) -> Option<Vec<u8>> {
    let root = trie();
    let mut out = Vec::new();
    let mut node = root;
    let mut bit_buf: u64 = 0;
    let mut bit_count: u32 = 0;
    // Bits consumed since the last complete symbol, kept around so we can
    // validate them as EOS padding if the input ends mid-code.
    let mut pending_bits: u64 = 0;
    let mut pending_len: u32 = 0;

    for &byte in input {
        bit_buf = (bit_buf << 8) | byte as u64;
        bit_count += 8;
        while bit_count >= 1 {
            let bit = (bit_buf >> (bit_count - 1)) & 1;
            bit_count -= 1;
            node = if bit == 0 { node.left.as_deref()? } else { node.right.as_deref()? };
            pending_bits = (pending_bits << 1) | bit;
            pending_len += 1;
            if let Some(symbol) = node.symbol {
                if symbol == 256 {
                    return None;
                }
                out.push(symbol as u8);
                node = root;
                pending_bits = 0;
                pending_len = 0;
            }
        }
    }

    if pending_len > 0 {
        if pending_len > 7 {
            return None;
        }
        let all_ones = (1u64 << pending_len) - 1;
        if pending_bits != all_ones {
            return None;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_rfc_example_string() {
        // RFC 7541 §C.4.1: "www.example.com" Huffman-encodes to this.
        let expected_hex = "f1e3c2e5f23a6ba0ab90f4ff";
        let expected: Vec<u8> = (0..expected_hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&expected_hex[i..i + 2], 16).unwrap())
            .collect();
        let encoded = encode(b"www.example.com");
        assert_eq!(encoded, expected);
        assert_eq!(decode(&encoded).unwrap(), b"www.example.com");
    }

    #[test]
    fn round_trips_arbitrary_ascii() {
        let text = b"The quick brown fox jumps over the lazy dog 1234567890!@#$%";
        let encoded = encode(text);
        assert_eq!(decode(&encoded).unwrap(), text);
    }

    #[test]
    fn eos_symbol_in_the_middle_is_rejected() {
        // The EOS code is all-ones, 30 bits long; embed it directly.
        let eos_bits: u64 = 0x3fffffff;
        let mut buf = Vec::new();
        buf.push((eos_bits >> 22) as u8);
        buf.push((eos_bits >> 14) as u8);
        buf.push((eos_bits >> 6) as u8);
        buf.push(((eos_bits << 2) & 0xff) as u8);
        assert!(decode(&buf).is_none());
    }
}
