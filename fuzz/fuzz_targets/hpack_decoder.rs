#![no_main]
use libfuzzer_sys::fuzz_target;
use vellum::hpack::Session;

fuzz_target!(|data: &[u8]| {
    let session = Session::new();
    let mut dec = session.new_decoder(4096);
    let _ = dec.decode(data);
});
