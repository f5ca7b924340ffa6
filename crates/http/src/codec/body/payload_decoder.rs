//! Decoder for response payloads.
//!
//! Picks the framing announced by the response head:
//! - `Content-Length` delimited payloads
//! - chunked transfer encoding
//! - payloads delimited by the server closing the connection
//! - no payload at all

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),

    Chunked(ChunkedDecoder),

    /// Everything up to EOF of the connection, `true` once EOF was reported
    UntilClose(bool),

    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose(false) }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            PayloadSize::Empty => PayloadDecoder::empty(),
            PayloadSize::UntilClose => PayloadDecoder::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose(_) if src.is_empty() => Ok(None),
            Kind::UntilClose(_) => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    /// Only a close-delimited payload may legitimately end with the connection,
    /// the others report the truncation by ending without EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !matches!(self.kind, Kind::UntilClose(_)) {
            return match self.decode(src)? {
                Some(item) => Ok(Some(item)),
                None if src.is_empty() => Ok(None),
                None => Err(ParseError::invalid_body("bytes remaining on stream")),
            };
        }

        if !src.is_empty() {
            return Ok(Some(PayloadItem::Chunk(src.split().freeze())));
        }

        match &mut self.kind {
            Kind::UntilClose(finished) if !*finished => {
                *finished = true;
                Ok(Some(PayloadItem::Eof))
            }
            _ => Ok(None),
        }
    }
}
