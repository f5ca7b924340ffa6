//! Streaming decoder for responses.
//!
//! The decoder first yields a [`Message::Header`] with the response head and
//! its [`PayloadSize`], then one [`Message::Payload`] per body chunk and a
//! final [`PayloadItem::Eof`]. After EOF it is ready for the next response on
//! the same connection.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for responses that handles both the head and the payload.
///
/// `payload_decoder` is `None` while a head is expected.
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tells the decoder the next response answers a `HEAD` request.
    pub fn set_head_request(&mut self, head_request: bool) {
        self.header_decoder.set_head_request(head_request);
    }

    fn on_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(ResponseHead, PayloadSize)>> {
        match item {
            Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
            Some(item @ PayloadItem::Eof) => {
                self.payload_decoder.take();
                Some(Message::Payload(item))
            }
            None => None,
        }
    }
}

impl Decoder for ResponseDecoder {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload(item));
        }

        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(ParseError::invalid_header("connection closed inside a response head")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn header(message: Option<Message<(ResponseHead, PayloadSize)>>) -> (ResponseHead, PayloadSize) {
        match message {
            Some(Message::Header(header)) => header,
            _ => panic!("expected a response head"),
        }
    }

    fn payload(message: Option<Message<(ResponseHead, PayloadSize)>>) -> PayloadItem {
        message.and_then(Message::into_payload_item).expect("expected a payload item")
    }

    #[test]
    fn two_pipelined_responses() {
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello\
               HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nnop\r\n0\r\n\r\n"[..],
        );
        let mut decoder = ResponseDecoder::new();

        let (head, size) = header(decoder.decode(&mut buf).unwrap());
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(size, PayloadSize::Length(5));
        assert_eq!(payload(decoder.decode(&mut buf).unwrap()).as_bytes().unwrap(), "hello");
        assert!(payload(decoder.decode(&mut buf).unwrap()).is_eof());

        let (head, size) = header(decoder.decode(&mut buf).unwrap());
        assert_eq!(head.status(), StatusCode::NOT_FOUND);
        assert!(size.is_chunked());
        assert_eq!(payload(decoder.decode(&mut buf).unwrap()).as_bytes().unwrap(), "nop");
        assert!(payload(decoder.decode(&mut buf).unwrap()).is_eof());
        assert!(buf.is_empty());
    }

    #[test]
    fn head_response_has_no_payload() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 1024\r\n\r\n"[..]);
        let mut decoder = ResponseDecoder::new();
        decoder.set_head_request(true);

        let (_, size) = header(decoder.decode(&mut buf).unwrap());
        assert!(size.is_empty());
        assert!(payload(decoder.decode(&mut buf).unwrap()).is_eof());
    }

    #[test]
    fn close_delimited_payload_ends_at_eof() {
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nlegacy body"[..]);
        let mut decoder = ResponseDecoder::new();

        let (_, size) = header(decoder.decode(&mut buf).unwrap());
        assert!(size.is_until_close());
        assert_eq!(payload(decoder.decode(&mut buf).unwrap()).as_bytes().unwrap(), "legacy body");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(payload(decoder.decode_eof(&mut buf).unwrap()).is_eof());
    }

    #[test]
    fn truncated_head_is_an_error() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Le"[..]);
        let mut decoder = ResponseDecoder::new();
        assert!(decoder.decode_eof(&mut buf).is_err());
    }
}
