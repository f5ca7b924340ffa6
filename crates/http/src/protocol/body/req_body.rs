use std::fmt;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::protocol::PayloadSize;

/// Outgoing request payload.
///
/// A body is either fully buffered, in which case it can be replayed for a
/// retry, or a one-shot reader streamed with chunked transfer encoding.
pub struct ReqBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Bytes),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl ReqBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// An empty buffer is normalized to [`ReqBody::empty`].
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() { Self::empty() } else { Self { kind: Kind::Full(bytes) } }
    }

    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self { kind: Kind::Stream(Box::new(reader)) }
    }

    /// Framing used when this body goes on the wire.
    pub fn payload_size(&self) -> PayloadSize {
        match &self.kind {
            Kind::Empty => PayloadSize::Empty,
            Kind::Full(bytes) => PayloadSize::new_length(bytes.len() as u64),
            Kind::Stream(_) => PayloadSize::Chunked,
        }
    }

    /// Buffered bytes, `None` for a streaming body.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            Kind::Empty => Some(&[]),
            Kind::Full(bytes) => Some(bytes),
            Kind::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, Kind::Stream(_))
    }

    /// A cheap copy for replaying the request, streams can't be replayed.
    pub fn try_clone(&self) -> Option<Self> {
        match &self.kind {
            Kind::Empty => Some(Self::empty()),
            Kind::Full(bytes) => Some(Self { kind: Kind::Full(bytes.clone()) }),
            Kind::Stream(_) => None,
        }
    }

    pub(crate) fn into_source(self) -> BodySource {
        match self.kind {
            Kind::Empty => BodySource::Full(None),
            Kind::Full(bytes) => BodySource::Full(Some(bytes)),
            Kind::Stream(reader) => BodySource::Stream(reader),
        }
    }
}

/// What the connection driver writes after the request head.
pub(crate) enum BodySource {
    Full(Option<Bytes>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Default for ReqBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ReqBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("ReqBody::Empty"),
            Kind::Full(bytes) => f.debug_tuple("ReqBody::Full").field(&bytes.len()).finish(),
            Kind::Stream(_) => f.write_str("ReqBody::Stream"),
        }
    }
}

impl From<Bytes> for ReqBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<Vec<u8>> for ReqBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for ReqBody {
    fn from(text: String) -> Self {
        Self::full(text)
    }
}

impl From<&'static str> for ReqBody {
    fn from(text: &'static str) -> Self {
        Self::full(Bytes::from_static(text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_body_is_replayable() {
        let body = ReqBody::from("hello");
        assert_eq!(body.payload_size(), PayloadSize::Length(5));
        let copy = body.try_clone().unwrap();
        assert_eq!(copy.as_bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn stream_body_is_one_shot() {
        let body = ReqBody::stream(&b"abc"[..]);
        assert!(body.is_stream());
        assert_eq!(body.payload_size(), PayloadSize::Chunked);
        assert!(body.try_clone().is_none());
        assert!(body.as_bytes().is_none());
    }

    #[test]
    fn empty_bytes_are_empty() {
        assert_eq!(ReqBody::full(Vec::new()).payload_size(), PayloadSize::Empty);
    }
}
