//! Client side HTTP/1.1 codec.
//!
//! Requests are written with [`RequestEncoder`] and responses read with
//! [`ResponseDecoder`]. Both are state machines over [`Message`] items: a head
//! first, then payload chunks closed by EOF. [`ClientCodec`] joins the two so a
//! single `Framed` transport can drive a connection, and keeps the decoder
//! informed about `HEAD` requests whose responses carry no payload.
//!
//! # Example
//!
//! ```no_run
//! use micro_client_http::codec::ClientCodec;
//! use tokio_util::codec::Framed;
//!
//! # async fn connect() -> std::io::Result<()> {
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:8080").await?;
//! let framed = Framed::new(stream, ClientCodec::new());
//! # drop(framed);
//! # Ok(())
//! # }
//! ```

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use request_encoder::RequestEncoder;
pub use response_decoder::ResponseDecoder;

use crate::protocol::{Message, ParseError, PayloadSize, RequestHead, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use http::Method;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Default)]
pub struct ClientCodec {
    encoder: RequestEncoder,
    decoder: ResponseDecoder,
}

impl ClientCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: Buf> Encoder<Message<(RequestHead, PayloadSize), D>> for ClientCodec {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if let Message::Header((head, _)) = &item {
            self.decoder.set_head_request(*head.method() == Method::HEAD);
        }
        self.encoder.encode(item, dst)
    }
}

impl Decoder for ClientCodec {
    type Item = Message<(ResponseHead, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode_eof(src)
    }
}
