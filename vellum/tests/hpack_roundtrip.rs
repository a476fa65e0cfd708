//! Invariant 3 (HPACK encode/decode round trip under dynamic-table-size
//! updates): decoded header multisets equal encoded inputs across a
//! sequence of header blocks and resize requests.

use proptest::prelude::*;

use vellum::header::HeaderMap;
use vellum::hpack::Session;

fn header_block_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    let name = prop_oneof![
        Just("x-demo".to_string()),
        Just("accept".to_string()),
        Just("cache-control".to_string()),
        Just(":path".to_string()),
    ];
    let value = "[a-z0-9]{1,10}";
    prop::collection::vec((name, value), 1..5)
}

fn to_multiset(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut v: Vec<(String, String)> = headers.iter().map(|(n, val)| (n.to_ascii_lowercase(), val.clone())).collect();
    v.sort();
    v
}

fn map_to_multiset(map: &HeaderMap) -> Vec<(String, String)> {
    let mut v: Vec<(String, String)> = map.iter().map(|(n, val)| (n.to_ascii_lowercase(), val.to_string())).collect();
    v.sort();
    v
}

proptest! {
    #[test]
    fn header_blocks_round_trip_across_table_resizes(
        blocks in prop::collection::vec(header_block_strategy(), 1..8),
        resizes in prop::collection::vec(0u32..=4096, 1..8),
    ) {
        let session = Session::new();
        let mut encoder = session.new_encoder(4096);
        let mut decoder = session.new_decoder(4096);

        for (i, block) in blocks.iter().enumerate() {
            if let Some(cap) = resizes.get(i) {
                encoder.set_table_size(*cap).unwrap();
            }

            let mut headers = HeaderMap::new();
            for (name, value) in block {
                headers.add(name, value.clone()).unwrap();
            }

            let encoded = encoder.encode(&headers);
            let decoded = decoder.decode(&encoded).unwrap();

            prop_assert_eq!(map_to_multiset(&decoded), to_multiset(block));
        }
    }
}
