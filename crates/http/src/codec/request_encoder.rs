use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, RequestHead, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

/// Streaming encoder for requests: a head followed by its payload items.
///
/// A new head is only accepted once the previous payload is complete.
#[derive(Debug, Default)]
pub struct RequestEncoder {
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Buf> Encoder<Message<(RequestHead, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                let payload_encoder = PayloadEncoder::try_from(payload_size)?;
                HeaderEncoder.encode((head, payload_size), dst)?;
                if !payload_encoder.is_finish() {
                    self.payload_encoder = Some(payload_encoder);
                }
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect request head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::Request;

    type Item = Message<(RequestHead, PayloadSize), Bytes>;

    fn head(request: Request<()>, size: PayloadSize) -> Item {
        Message::Header((RequestHead::from(request), size))
    }

    #[test]
    fn length_body_then_next_request() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(Request::post("/a").body(()).unwrap(), PayloadSize::Length(4)), &mut dst).unwrap();
        encoder.encode(Item::from(Bytes::from_static(b"ping")), &mut dst).unwrap();
        encoder.encode(head(Request::get("/b").body(()).unwrap(), PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], &b"POST /a HTTP/1.1\r\ncontent-length: 4\r\n\r\npingGET /b HTTP/1.1\r\n\r\n"[..]);
    }

    #[test]
    fn chunked_body_needs_eof() {
        let mut encoder = RequestEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(head(Request::put("/up").body(()).unwrap(), PayloadSize::Chunked), &mut dst).unwrap();
        encoder.encode(Item::from(Bytes::from_static(b"abc")), &mut dst).unwrap();
        assert!(encoder.encode(head(Request::get("/").body(()).unwrap(), PayloadSize::Empty), &mut dst).is_err());

        encoder.encode(Item::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert!(dst.ends_with(b"3\r\nabc\r\n0\r\n\r\n"));
    }

    #[test]
    fn payload_without_head_is_rejected() {
        let mut encoder = RequestEncoder::new();
        assert!(encoder.encode(Item::from(Bytes::from_static(b"x")), &mut BytesMut::new()).is_err());
    }
}
