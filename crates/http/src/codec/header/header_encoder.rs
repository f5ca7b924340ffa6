//! Serializes a [`RequestHead`] into the request line and header block.
//!
//! The framing headers always follow the payload the connection is about to
//! write: `Content-Length` for a buffered body, `Transfer-Encoding: chunked`
//! for a streamed one. Whatever the caller put there is overwritten.

use crate::protocol::{PayloadSize, RequestHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");
const ZERO: HeaderValue = HeaderValue::from_static("0");

pub struct HeaderEncoder;

impl Encoder<(RequestHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let version = match head.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} {}\r\n", head.method(), head.target(), version)?;

        let expects_body = head.expects_body();
        let headers = head.headers_mut();
        match payload_size {
            PayloadSize::Length(n) => {
                headers.remove(header::TRANSFER_ENCODING);
                headers.insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                headers.remove(header::CONTENT_LENGTH);
                headers.insert(header::TRANSFER_ENCODING, CHUNKED);
            }
            PayloadSize::Empty => {
                headers.remove(header::TRANSFER_ENCODING);
                if expects_body {
                    headers.insert(header::CONTENT_LENGTH, ZERO);
                } else {
                    headers.remove(header::CONTENT_LENGTH);
                }
            }
            PayloadSize::UntilClose => {
                return Err(SendError::invalid_body("a request payload can't be close delimited"));
            }
        }

        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// `io::Write` over a `BytesMut` that has already reserved room for the head.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;
    use indoc::indoc;

    fn encode(request: Request<()>, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((RequestHead::from(request), payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap().replace("\r\n", "\n")
    }

    #[test]
    fn get_without_body() {
        let request = Request::get("/users?id=7")
            .header("host", "example.com")
            .header("content-length", "12")
            .body(())
            .unwrap();

        let expected = indoc! {"
            GET /users?id=7 HTTP/1.1
            host: example.com

        "};
        assert_eq!(encode(request, PayloadSize::Empty), expected);
    }

    #[test]
    fn post_with_length() {
        let request = Request::post("/submit").header("host", "example.com").body(()).unwrap();

        let expected = indoc! {"
            POST /submit HTTP/1.1
            host: example.com
            content-length: 42

        "};
        assert_eq!(encode(request, PayloadSize::Length(42)), expected);
    }

    #[test]
    fn empty_post_announces_zero_length() {
        let request = Request::post("/submit").body(()).unwrap();
        assert_eq!(encode(request, PayloadSize::Empty), "POST /submit HTTP/1.1\ncontent-length: 0\n\n");
    }

    #[test]
    fn streamed_body_is_chunked() {
        let request = Request::put("http://proxy.target:8080/upload").header("content-length", "3").body(()).unwrap();
        assert_eq!(
            encode(request, PayloadSize::Chunked),
            "PUT http://proxy.target:8080/upload HTTP/1.1\ntransfer-encoding: chunked\n\n"
        );
    }

    #[test]
    fn close_delimited_request_is_rejected() {
        let mut dst = BytesMut::new();
        let head = RequestHead::from(Request::get("/").body(()).unwrap());
        assert!(HeaderEncoder.encode((head, PayloadSize::UntilClose), &mut dst).is_err());
    }
}
