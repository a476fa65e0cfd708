use std::env;
use std::time::Instant;

use vellum::header::HeaderMap;
use vellum::hpack::Session;
use vellum::http1::{serialize_request, Http1Receiver, RequestReceiver};
use vellum::message::{HttpVersion, Request, Scheme};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: bench_scenarios <hpack|http1|all> [iterations]");
        std::process::exit(1);
    }
    let scenario = &args[1];
    let iterations: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1_000_000);

    match scenario.as_str() {
        "hpack" => run_hpack(iterations),
        "http1" => run_http1(iterations),
        "all" => {
            run_hpack(iterations);
            run_http1(iterations);
        }
        _ => {
            eprintln!("Unknown scenario '{}'. Use hpack|http1|all", scenario);
            std::process::exit(1);
        }
    }
}

fn sample_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.set(":method", "GET").unwrap();
    headers.set(":scheme", "https").unwrap();
    headers.set(":authority", "example.com").unwrap();
    headers.set(":path", "/index.html").unwrap();
    headers.set("accept", "text/html,application/xhtml+xml").unwrap();
    headers
}

fn run_hpack(iterations: u64) {
    let session = Session::new();
    let mut encoder = session.new_encoder(4096);
    let mut decoder = session.new_decoder(4096);
    let headers = sample_headers();

    let start = Instant::now();
    for _ in 0..iterations {
        let encoded = encoder.encode(&headers);
        let _ = decoder.decode(&encoded).unwrap();
    }
    let dur = Instant::now() - start;
    println!(
        "hpack: {} round trips in {:.2?} => {:.2} round trips/s",
        iterations,
        dur,
        iterations as f64 / dur.as_secs_f64()
    );
}

fn run_http1(iterations: u64) {
    let mut request = Request::new(HttpVersion::Http1_1, "GET", Scheme::Https, "/index.html").unwrap();
    request.set_authority(Some("example.com".to_string())).unwrap();
    request.common_mut().headers_mut().set("accept", "*/*").unwrap();
    let wire = serialize_request(&request);

    let start = Instant::now();
    for _ in 0..iterations {
        let mut receiver = RequestReceiver::new(Scheme::Https);
        let _ = receiver.receive(&wire).unwrap();
        let _ = receiver.take_request().unwrap();
    }
    let dur = Instant::now() - start;
    println!(
        "http1: {} parses in {:.2?} => {:.2} parses/s",
        iterations,
        dur,
        iterations as f64 / dur.as_secs_f64()
    );
}
