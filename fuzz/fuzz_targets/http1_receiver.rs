#![no_main]
use libfuzzer_sys::fuzz_target;
use vellum::http1::{Http1Receiver, RequestReceiver};
use vellum::Scheme;

fuzz_target!(|data: &[u8]| {
    let mut recv = RequestReceiver::new(Scheme::Http);
    let _ = recv.receive(data);
});
