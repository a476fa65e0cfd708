//! Serializes a [`Request`] or [`Response`] to its HTTP/1 wire form:
//! start line, headers (synthesizing `host` first for requests), blank
//! line. The whole thing is built as UTF-8 text and returned as a single
//! buffer — callers write it through a [`crate::socket::WritableSocket`].

use crate::message::{Request, Response};

pub fn serialize_request(request: &Request) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(request.method());
    out.push(' ');
    out.push_str(request.path());
    out.push(' ');
    out.push_str(&request.common().version().to_string());
    out.push_str("\r\n");

    if let Some(authority) = request.authority() {
        out.push_str("host: ");
        out.push_str(authority);
        out.push_str("\r\n");
    }
    write_headers(&mut out, request.common().headers());
    out.push_str("\r\n");
    out.into_bytes()
}

pub fn serialize_response(response: &Response) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&response.common().version().to_string());
    out.push(' ');
    out.push_str(&response.status().to_string());
    out.push_str("\r\n");
    write_headers(&mut out, response.common().headers());
    out.push_str("\r\n");
    out.into_bytes()
}

fn write_headers(out: &mut String, headers: &crate::header::HeaderMap) {
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{HttpVersion, Scheme};

    #[test]
    fn request_synthesizes_host_before_other_headers() {
        let mut req = Request::new(HttpVersion::Http1_1, "GET", Scheme::Https, "/a").unwrap();
        req.set_authority(Some("example.com".to_string())).unwrap();
        req.common_mut().headers_mut().set("accept", "*/*").unwrap();
        let out = String::from_utf8(serialize_request(&req)).unwrap();
        assert_eq!(out, "GET /a HTTP/1.1\r\nhost: example.com\r\naccept: */*\r\n\r\n");
    }

    #[test]
    fn response_start_line_has_no_reason_phrase() {
        let resp = Response::new(HttpVersion::Http1_1, 404);
        let out = String::from_utf8(serialize_response(&resp)).unwrap();
        assert_eq!(out, "HTTP/1.1 404\r\n\r\n");
    }

    #[test]
    fn request_without_authority_omits_host() {
        let req = Request::new(HttpVersion::Http1_1, "OPTIONS", Scheme::Http, "*").unwrap();
        let out = String::from_utf8(serialize_request(&req)).unwrap();
        assert_eq!(out, "OPTIONS * HTTP/1.1\r\n\r\n");
    }
}
