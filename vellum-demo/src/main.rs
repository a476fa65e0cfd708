//! Minimal example wiring a blocking `TcpStream` to the vellum sans-I/O
//! engine. Accepts connections, runs an HTTP/2 endpoint per connection on
//! its own thread, and answers every request with a fixed 200 response.
//! The engine never touches the socket directly — this binary is the thin
//! embedder shim the crate is designed to sit behind.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::thread;

use clap::Parser;

use vellum::h2::{Endpoint, EndpointHandler, MessageStreamEvent, MessageStreamHandler, StreamContext};
use vellum::socket::BufferedSocket;
use vellum::{HttpVersion, Response};
use vellum_core::config::EndpointLimits;
use vellum_core::{log_error, log_info, log_warn};

#[derive(Parser)]
#[command(name = "vellum-demo", about = "Blocking TCP demo server for the vellum engine", version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let listener = match TcpListener::bind(&cli.addr) {
        Ok(l) => l,
        Err(e) => {
            log_error!("failed to bind {}: {}", cli.addr, e);
            std::process::exit(1);
        }
    };
    log_info!("listening on {}", cli.addr);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log_warn!("accept failed: {}", e);
                continue;
            }
        };
        thread::spawn(move || serve(stream));
    }
}

fn serve(stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());
    let mut reader = match stream.try_clone() {
        Ok(r) => r,
        Err(e) => {
            log_warn!("could not clone stream for {}: {}", peer, e);
            return;
        }
    };
    let socket = BufferedSocket::new(stream, peer.clone());
    let mut endpoint = match Endpoint::new_server(socket, EndpointLimits::new(), Box::new(EchoHandler)) {
        Ok(e) => e,
        Err(e) => {
            log_warn!("failed to start endpoint for {}: {}", peer, e);
            return;
        }
    };

    let mut buf = [0u8; 16 * 1024];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log_warn!("read error from {}: {}", peer, e);
                break;
            }
        };
        if let Err(e) = endpoint.receive(&buf[..n]) {
            log_warn!("connection {} closed: {}", peer, e);
            break;
        }
    }
    log_info!("connection {} finished", peer);
}

struct EchoHandler;

impl<S: vellum::WritableSocket> EndpointHandler<S> for EchoHandler {
    fn on_new_stream(&mut self, _ctx: &mut StreamContext<'_, S>) -> Box<dyn MessageStreamHandler<S>> {
        Box::new(RespondOnceHandler)
    }
}

/// Answers the request once its headers have arrived; ignores any body and
/// trailers that follow, since this demo does not echo request content.
struct RespondOnceHandler;

impl<S: vellum::WritableSocket> MessageStreamHandler<S> for RespondOnceHandler {
    fn handle(&mut self, ctx: &mut StreamContext<'_, S>, event: MessageStreamEvent) {
        match event {
            MessageStreamEvent::Message(_) => {
                let mut response = Response::new(HttpVersion::Http2, 200);
                let _ = response.common_mut().headers_mut().set("content-type", "text/plain");
                if let Err(e) = ctx.send_response(response, true) {
                    log_warn!("failed to send response: {}", e);
                }
            }
            MessageStreamEvent::Error(e) => log_warn!("stream error: {}", e),
            _ => {}
        }
    }
}
