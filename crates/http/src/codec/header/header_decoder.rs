//! Parses a response head from raw bytes.
//!
//! The status line and header fields are parsed with `httparse` and converted
//! into a [`ResponseHead`]. The decoder then works out how the payload that
//! follows is framed, per
//! [RFC 9112 Section 6.3](https://www.rfc-editor.org/rfc/rfc9112#section-6.3):
//!
//! 1. responses to `HEAD`, `1xx`, `204` and `304` never have a payload
//! 2. `Transfer-Encoding` wins over `Content-Length`; when chunked is not the
//!    final coding the payload runs until the connection closes
//! 3. `Content-Length` gives the exact length
//! 4. otherwise the payload runs until the connection closes
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, ResponseHead};

const MAX_HEADER_NUM: usize = 64;

const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for response heads.
///
/// The framing of a response depends on the request it answers, so the
/// decoder is told whether that request was a `HEAD` before each response.
#[derive(Debug, Default)]
pub struct HeaderDecoder {
    head_request: bool,
}

impl HeaderDecoder {
    pub fn set_head_request(&mut self, head_request: bool) {
        self.head_request = head_request;
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // shortest possible head is "HTTP/1.1 200 \r\n\r\n"
        if src.len() < 17 {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut headers);

        let parsed_result = resp.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(header_size = body_offset, "parsed response head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match resp.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let status = resp
            .code
            .and_then(|code| StatusCode::from_u16(code).ok())
            .ok_or(ParseError::InvalidStatus(resp.code))?;

        let mut response = Response::new(());
        *response.status_mut() = status;
        *response.version_mut() = version;

        let header_map = response.headers_mut();
        header_map.reserve(resp.headers.len());
        for header in resp.headers.iter() {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(header.value).map_err(ParseError::invalid_header)?;
            header_map.append(name, value);
        }

        let head = ResponseHead::from(response);
        let payload_size = parse_payload(&head, self.head_request)?;

        let _ = src.split_to(body_offset);
        Ok(Some((head, payload_size)))
    }
}

fn parse_payload(head: &ResponseHead, head_request: bool) -> Result<PayloadSize, ParseError> {
    if head_request || head.forbids_body() {
        return Ok(PayloadSize::new_empty());
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = head.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (Some(te_value), _) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::new_chunked())
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;

            let length = cl_str
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            Ok(PayloadSize::new_length(length))
        }

        (None, None) => Ok(PayloadSize::UntilClose),
    }
}

/// Chunked must be the final transfer coding to frame the payload.
fn is_chunked(value: &HeaderValue) -> bool {
    value.as_bytes().rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Version;
    use indoc::indoc;

    fn decode(raw: &str, head_request: bool) -> (ResponseHead, PayloadSize, BytesMut) {
        let mut buf = BytesMut::from(raw.replace('\n', "\r\n").as_str());
        let mut decoder = HeaderDecoder::default();
        decoder.set_head_request(head_request);
        let (head, payload_size) = decoder.decode(&mut buf).unwrap().unwrap();
        (head, payload_size, buf)
    }

    #[test]
    fn check_is_chunked() {
        assert!(is_chunked(&HeaderValue::from_static("gzip, chunked")));
        assert!(is_chunked(&HeaderValue::from_static("Chunked")));
        assert!(!is_chunked(&HeaderValue::from_static("chunked, gzip")));
        assert!(!is_chunked(&HeaderValue::from_static("gzip")));
    }

    #[test]
    fn content_length_response() {
        let raw = indoc! {r#"
        HTTP/1.1 200 OK
        Content-Type: application/json
        Content-Length: 11
        Set-Cookie: a=1
        Set-Cookie: b=2

        {"ok":true}"#};

        let (head, payload_size, rest) = decode(raw, false);

        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(head.version(), Version::HTTP_11);
        assert_eq!(payload_size, PayloadSize::Length(11));
        assert_eq!(head.headers().get_all(http::header::SET_COOKIE).iter().count(), 2);
        assert_eq!(&rest[..], br#"{"ok":true}"#);
    }

    #[test]
    fn chunked_wins_over_length() {
        let raw = indoc! {"
        HTTP/1.1 200 OK
        Transfer-Encoding: chunked
        Content-Length: 100

        "};
        let (_, payload_size, _) = decode(raw, false);
        assert_eq!(payload_size, PayloadSize::Chunked);
    }

    #[test]
    fn bodyless_responses() {
        let no_content = indoc! {"
        HTTP/1.1 204 No Content
        Content-Length: 10

        "};
        assert_eq!(decode(no_content, false).1, PayloadSize::Empty);

        let head = indoc! {"
        HTTP/1.1 200 OK
        Content-Length: 10

        "};
        assert_eq!(decode(head, true).1, PayloadSize::Empty);
    }

    #[test]
    fn unframed_response_reads_until_close() {
        let raw = indoc! {"
        HTTP/1.0 200 OK
        Server: legacy

        "};
        let (head, payload_size, _) = decode(raw, false);
        assert_eq!(head.version(), Version::HTTP_10);
        assert!(payload_size.is_until_close());
    }

    #[test]
    fn partial_head_needs_more() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Le"[..]);
        assert!(HeaderDecoder::default().decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 27);
    }

    #[test]
    fn invalid_content_length() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\n\r\n"[..]);
        assert!(HeaderDecoder::default().decode(&mut buf).is_err());
    }
}
