use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace};

use crate::protocol::{HttpError, ParseError, PayloadItem};
use crate::transport::PooledConnection;

/// Incoming response payload.
///
/// A streaming body owns the connection it reads from. The connection goes
/// back to its host pool once the payload is read to the end, and is closed
/// if the body is dropped early or fails.
pub struct RespBody {
    kind: Kind,
    deadline: Option<Pin<Box<Sleep>>>,
}

enum Kind {
    Once(Option<Bytes>),
    Streaming(Option<PooledConnection>),
}

impl RespBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Once(None), deadline: None }
    }

    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let kind = if bytes.is_empty() { Kind::Once(None) } else { Kind::Once(Some(bytes)) };
        Self { kind, deadline: None }
    }

    pub(crate) fn streaming(connection: PooledConnection) -> Self {
        Self { kind: Kind::Streaming(Some(connection)), deadline: None }
    }

    /// Reading past `deadline` fails with [`HttpError::Timeout`] and closes the connection.
    pub fn set_deadline(&mut self, deadline: Instant) {
        match &mut self.deadline {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.deadline = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }
}

impl Body for RespBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        let slot = match &mut this.kind {
            Kind::Once(bytes) => return Poll::Ready(bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Streaming(slot) => slot,
        };

        let Some(connection) = slot else {
            return Poll::Ready(None);
        };

        if let Some(deadline) = &mut this.deadline
            && deadline.as_mut().poll(cx).is_ready()
        {
            debug!("response body deadline exceeded, closing connection");
            slot.take();
            return Poll::Ready(Some(Err(HttpError::Timeout)));
        }

        match ready!(connection.poll_payload(cx)) {
            Some(Ok(PayloadItem::Chunk(bytes))) => {
                trace!(len = bytes.len(), "read response body chunk");
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Some(Ok(PayloadItem::Eof)) => {
                // dropping the lease hands the connection back to its pool
                slot.take();
                Poll::Ready(None)
            }
            Some(Err(e)) => {
                slot.take();
                Poll::Ready(Some(Err(e.into())))
            }
            None => {
                slot.take();
                Poll::Ready(Some(Err(ParseError::invalid_body("connection closed before message completed").into())))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Once(bytes) => bytes.is_none(),
            Kind::Streaming(slot) => slot.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Streaming(_) => SizeHint::default(),
        }
    }
}

impl Default for RespBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for RespBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Once(bytes) => f.debug_tuple("RespBody::Once").field(&bytes.as_ref().map(Bytes::len)).finish(),
            Kind::Streaming(slot) => f.debug_struct("RespBody::Streaming").field("open", &slot.is_some()).finish(),
        }
    }
}

impl From<Bytes> for RespBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for RespBody {
    fn from(text: String) -> Self {
        Self::full(text)
    }
}

impl From<&'static str> for RespBody {
    fn from(text: &'static str) -> Self {
        Self::full(Bytes::from_static(text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn full_body_yields_once() {
        let mut body = RespBody::full("hello");
        assert_eq!(body.size_hint().exact(), Some(5));
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"hello"));
        assert!(body.frame().await.is_none());
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn empty_body_collects_nothing() {
        let bytes = RespBody::empty().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }
}
