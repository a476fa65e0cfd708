//! Invariant 1 (serialize/parse round trip for HTTP/1 requests).

use proptest::prelude::*;

use vellum::http1::{Http1Receiver, RequestReceiver, ReceiveOutcome};
use vellum::http1::serialize_request;
use vellum::message::{HttpVersion, Request, Scheme};

fn method_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("GET"),
        Just("POST"),
        Just("PUT"),
        Just("DELETE"),
        Just("HEAD"),
        Just("OPTIONS"),
        Just("PATCH"),
    ]
}

fn version_strategy() -> impl Strategy<Value = HttpVersion> {
    prop_oneof![Just(HttpVersion::Http1_0), Just(HttpVersion::Http1_1)]
}

fn token_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9-]{0,9}".prop_filter("must not be host", |s| !s.eq_ignore_ascii_case("host"))
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[!-~]{1,20}"
}

fn header_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((token_strategy(), value_strategy()), 0..6)
}

proptest! {
    #[test]
    fn request_round_trips_through_serialize_then_parse(
        method in method_strategy(),
        path in "/[a-zA-Z0-9/]{0,12}",
        version in version_strategy(),
        headers in header_strategy(),
        chunked in any::<bool>(),
    ) {
        let mut request = Request::new(version, method, Scheme::Https, path.clone()).unwrap();
        request.set_authority(Some("example.com".to_string())).unwrap();
        for (name, value) in &headers {
            request.common_mut().headers_mut().add(name, value.clone()).unwrap();
        }
        if chunked {
            request.common_mut().headers_mut().add("transfer-encoding", "chunked").unwrap();
        }
        request.common_mut().set_chunked(chunked).unwrap();

        let wire = serialize_request(&request);

        let mut receiver = RequestReceiver::new(Scheme::Https);
        let outcome = receiver.receive(&wire).unwrap();
        prop_assert!(matches!(outcome, ReceiveOutcome::Complete { .. }));
        let parsed = receiver.take_request().unwrap();

        prop_assert_eq!(parsed.method(), request.method());
        prop_assert_eq!(parsed.scheme(), request.scheme());
        prop_assert_eq!(parsed.authority(), request.authority());
        prop_assert_eq!(parsed.path(), request.path());
        prop_assert_eq!(parsed.common().version(), request.common().version());
        prop_assert_eq!(parsed.common().is_chunked(), request.common().is_chunked());

        let mut expected: Vec<(String, String)> = request
            .common()
            .headers()
            .iter()
            .map(|(n, v)| (n.to_ascii_lowercase(), v.to_string()))
            .collect();
        let mut actual: Vec<(String, String)> = parsed
            .common()
            .headers()
            .iter()
            .map(|(n, v)| (n.to_ascii_lowercase(), v.to_string()))
            .collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }
}
