#![no_main]
use libfuzzer_sys::fuzz_target;

use vellum::h2::{Endpoint, EndpointHandler, MessageStreamEvent, MessageStreamHandler, StreamContext};
use vellum::socket::BufferedSocket;
use vellum::WritableSocket;
use vellum_core::config::EndpointLimits;

struct NullHandler;
impl<S: WritableSocket> EndpointHandler<S> for NullHandler {
    fn on_new_stream(&mut self, _ctx: &mut StreamContext<'_, S>) -> Box<dyn MessageStreamHandler<S>> {
        Box::new(NullStreamHandler)
    }
}

struct NullStreamHandler;
impl<S: WritableSocket> MessageStreamHandler<S> for NullStreamHandler {
    fn handle(&mut self, _ctx: &mut StreamContext<'_, S>, _event: MessageStreamEvent) {}
}

// Feeds arbitrary bytes to a server endpoint in small, ragged chunks so the
// inbound frame-reassembly buffer sees every split point a slow peer could
// produce, not just whole-frame deliveries.
fuzz_target!(|data: &[u8]| {
    let socket = BufferedSocket::new(Vec::new(), "fuzz");
    let mut endpoint = match Endpoint::new_server(socket, EndpointLimits::new(), Box::new(NullHandler)) {
        Ok(e) => e,
        Err(_) => return,
    };

    for chunk in data.chunks(3) {
        if endpoint.receive(chunk).is_err() {
            return;
        }
    }
});
