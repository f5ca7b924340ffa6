use bytes::{Buf, Bytes};

/// One unit flowing through the client codec: either a message head or a piece of its payload.
///
/// On the write side `T` is `(RequestHead, PayloadSize)`, on the read side it is
/// `(ResponseHead, PayloadSize)`. `Data` is the buffer type of payload chunks.
pub enum Message<T, Data: Buf = Bytes> {
    /// Head of a request or response
    Header(T),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of a payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

/// How a payload is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` delimited
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// No payload at all
    Empty,
    /// Delimited by the peer closing the connection, only valid for responses
    UntilClose,
}

impl PayloadSize {
    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// A zero length is normalized to [`PayloadSize::Empty`]
    #[inline]
    pub fn new_length(length: u64) -> Self {
        if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) }
    }

    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns `None` for a header message
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(PayloadSize::new_length(0), PayloadSize::Empty);
        assert_eq!(PayloadSize::new_length(7), PayloadSize::Length(7));
        assert!(PayloadSize::UntilClose.is_until_close());
    }

    #[test]
    fn payload_message_from_bytes() {
        let message: Message<()> = Bytes::from_static(b"abc").into();
        assert!(message.is_payload());
        let item = message.into_payload_item().unwrap();
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"abc"));
        assert!(!item.is_eof());
    }
}
