use std::io;
use std::io::ErrorKind;
use std::task::{Context, Poll, Waker, ready};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Framed;
use tracing::{trace, warn};

use crate::codec::ClientCodec;
use crate::protocol::body::{BodySource, ReqBody};
use crate::protocol::{HttpError, Message, ParseError, PayloadItem, PayloadSize, RequestHead, ResponseHead, SendError};
use crate::transport::BoxedIo;

/// Read buffer size of a connection and chunk size of streamed request bodies
const BUFFER_SIZE: usize = 8 * 1024;

type Outgoing = Message<(RequestHead, PayloadSize), Bytes>;

/// One HTTP/1.1 connection, driven from the client side.
///
/// A connection carries one exchange at a time: [`HttpConnection::send_request`]
/// writes the request and reads up to the final response head, then the payload
/// is pulled with [`HttpConnection::poll_payload`] until EOF. Only then can the
/// connection carry another exchange, and only if the server allowed it.
pub struct HttpConnection {
    framed: Framed<BoxedIo, ClientCodec>,
    keep_alive: bool,
    in_flight: bool,
}

impl HttpConnection {
    pub fn new(io: BoxedIo) -> Self {
        Self { framed: Framed::with_capacity(io, ClientCodec::new(), BUFFER_SIZE), keep_alive: true, in_flight: false }
    }

    /// No exchange in progress and the server did not ask to close.
    pub fn is_reusable(&self) -> bool {
        self.keep_alive && !self.in_flight
    }

    /// Writes the request, then reads up to the final response head.
    ///
    /// Informational `1xx` heads are skipped. The returned flag tells whether a
    /// payload follows the head; when it doesn't, the exchange is already
    /// complete.
    pub async fn send_request(&mut self, head: RequestHead, body: ReqBody) -> Result<(ResponseHead, bool), HttpError> {
        self.in_flight = true;

        let header = Outgoing::Header((head, body.payload_size()));
        match body.into_source() {
            BodySource::Full(None) => self.framed.send(header).await?,
            BodySource::Full(Some(bytes)) => {
                self.framed.feed(header).await?;
                self.framed.send(Outgoing::Payload(PayloadItem::Chunk(bytes))).await?;
            }
            BodySource::Stream(reader) => {
                self.framed.feed(header).await?;
                self.send_stream(reader).await?;
            }
        }

        loop {
            let (head, payload_size) = match self.framed.next().await {
                Some(Ok(Message::Header(header))) => header,
                Some(Ok(Message::Payload(_))) => {
                    return Err(ParseError::invalid_body("received payload while waiting for a response head").into());
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(ParseError::io(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "connection closed before a response was received",
                    ))
                    .into());
                }
            };

            if head.is_informational() {
                trace!(status = %head.status(), "skip informational response");
                self.skip_payload().await?;
                // the final response is still ahead
                self.in_flight = true;
                continue;
            }

            self.keep_alive = head.is_keep_alive() && !payload_size.is_until_close();

            if payload_size.is_empty() {
                self.skip_payload().await?;
                return Ok((head, false));
            }

            return Ok((head, true));
        }
    }

    async fn send_stream(&mut self, mut reader: Box<dyn AsyncRead + Send + Unpin>) -> Result<(), HttpError> {
        let mut buf = BytesMut::with_capacity(BUFFER_SIZE);
        loop {
            buf.reserve(BUFFER_SIZE);
            let n = reader.read_buf(&mut buf).await.map_err(SendError::io)?;
            if n == 0 {
                self.framed.send(Outgoing::Payload(PayloadItem::Eof)).await?;
                return Ok(());
            }
            self.framed.send(Outgoing::Payload(PayloadItem::Chunk(buf.split().freeze()))).await?;
        }
    }

    /// Consumes the EOF of a payload-less response.
    async fn skip_payload(&mut self) -> Result<(), HttpError> {
        match futures::future::poll_fn(|cx| self.poll_payload(cx)).await {
            Some(Ok(PayloadItem::Eof)) => Ok(()),
            Some(Ok(PayloadItem::Chunk(_))) => Err(ParseError::invalid_body("unexpected payload").into()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ParseError::invalid_body("connection closed before message completed").into()),
        }
    }

    /// Pulls the next item of the current response payload.
    ///
    /// `None` means the connection ended before the payload did.
    pub fn poll_payload(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<PayloadItem, ParseError>>> {
        let item = match ready!(self.framed.poll_next_unpin(cx)) {
            Some(Ok(Message::Payload(item))) => {
                if item.is_eof() {
                    self.in_flight = false;
                }
                Some(Ok(item))
            }
            Some(Ok(Message::Header(_))) => {
                self.keep_alive = false;
                Some(Err(ParseError::invalid_body("received a response head while reading a payload")))
            }
            Some(Err(e)) => {
                self.keep_alive = false;
                Some(Err(e))
            }
            None => {
                self.keep_alive = false;
                None
            }
        };
        Poll::Ready(item)
    }

    /// Checks an idle connection without blocking: the server closing it, or
    /// sending anything unsolicited, makes it unusable.
    pub fn is_closed(&mut self) -> bool {
        let mut cx = Context::from_waker(Waker::noop());
        match self.framed.poll_next_unpin(&mut cx) {
            Poll::Pending => false,
            Poll::Ready(Some(Ok(_))) => {
                warn!("unsolicited data on an idle connection");
                true
            }
            Poll::Ready(_) => true,
        }
    }
}
