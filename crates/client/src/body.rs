//! Request body encoding.
//!
//! A [`Body`] is one payload of a declared kind. Encoding happens when the
//! request is built and yields the wire bytes together with the
//! `Content-Type` announced for that kind.
//!
//! | kind        | content type                         |
//! |-------------|--------------------------------------|
//! | text        | `text/plain`                         |
//! | binary      | `application/octet-stream`           |
//! | json        | `application/json`                   |
//! | pb          | `application/octet-stream`           |
//! | pbjson      | `application/json`                   |
//! | xml         | `application/xml`                    |
//! | form        | `application/x-www-form-urlencoded`  |
//! | reader      | `application/octet-stream`           |
//!
//! Without a body the content type falls back to `text/html`. That fallback is
//! kept for compatibility with existing servers and is easy to trip over: a
//! bodyless request built through [`encode_body`] announces HTML.

use std::fmt;

use bytes::BytesMut;
use micro_client_http::protocol::body::ReqBody;
use prost_reflect::{ReflectMessage, SerializeOptions};
use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::trace;

use crate::error::EncodeError;

pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_XML: &str = "application/xml";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

/// The declared kind of a body, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Text,
    Binary,
    Json,
    Proto,
    ProtoJson,
    Xml,
    Form,
}

impl ContentKind {
    /// Case-insensitive lookup. `form`, `form-data` and `multipart` are
    /// aliases of `urlencoded`, multipart bodies have no encoding of their own.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "html" => Self::Html,
            "text" => Self::Text,
            "binary" | "reader" => Self::Binary,
            "json" => Self::Json,
            "pb" => Self::Proto,
            "pbjson" => Self::ProtoJson,
            "xml" => Self::Xml,
            "urlencoded" | "form" | "form-data" | "multipart" => Self::Form,
            _ => return None,
        };
        Some(kind)
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Html => TEXT_HTML,
            Self::Text => TEXT_PLAIN,
            Self::Binary | Self::Proto => APPLICATION_OCTET_STREAM,
            Self::Json | Self::ProtoJson => APPLICATION_JSON,
            Self::Xml => APPLICATION_XML,
            Self::Form => APPLICATION_FORM,
        }
    }
}

/// Content type for a kind name, unknown names fall back to `text/html`.
pub fn content_type_for(name: &str) -> &'static str {
    ContentKind::from_name(name).map_or(TEXT_HTML, ContentKind::content_type)
}

/// A request payload tagged with its kind.
pub enum Body {
    Text(String),
    Binary(bytes::Bytes),
    Json(Box<dyn JsonPayload>),
    Proto(Box<dyn ProtoPayload>),
    ProtoJson(Box<dyn ProtoJsonPayload>),
    /// `root` names the document element, `None` uses the type name.
    Xml { root: Option<String>, payload: Box<dyn XmlPayload> },
    Form(Vec<(String, String)>),
    /// Streamed as is, sent once and never replayed.
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn binary(bytes: impl Into<bytes::Bytes>) -> Self {
        Self::Binary(bytes.into())
    }

    pub fn json<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        Self::Json(Box::new(value))
    }

    pub fn proto<M: prost::Message + 'static>(message: M) -> Self {
        Self::Proto(Box::new(message))
    }

    pub fn proto_json<M: ReflectMessage + 'static>(message: M) -> Self {
        Self::ProtoJson(Box::new(message))
    }

    pub fn xml<T: Serialize + Send + Sync + 'static>(value: T) -> Self {
        Self::Xml { root: None, payload: Box::new(value) }
    }

    pub fn xml_with_root<T: Serialize + Send + Sync + 'static>(root: impl Into<String>, value: T) -> Self {
        Self::Xml { root: Some(root.into()), payload: Box::new(value) }
    }

    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn reader<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text(_) => ContentKind::Text,
            Self::Binary(_) | Self::Reader(_) => ContentKind::Binary,
            Self::Json(_) => ContentKind::Json,
            Self::Proto(_) => ContentKind::Proto,
            Self::ProtoJson(_) => ContentKind::ProtoJson,
            Self::Xml { .. } => ContentKind::Xml,
            Self::Form(_) => ContentKind::Form,
        }
    }

    pub fn content_type(&self) -> &'static str {
        self.kind().content_type()
    }

    /// Serializes the payload, consuming the body.
    pub fn encode(self) -> Result<EncodedBody, EncodeError> {
        let content_type = self.content_type();
        let body = match self {
            Self::Text(text) => ReqBody::from(text),
            Self::Binary(bytes) => ReqBody::from(bytes),
            Self::Json(payload) => ReqBody::from(payload.to_json().map_err(EncodeError::Json)?),
            Self::Proto(payload) => {
                let mut buf = BytesMut::with_capacity(payload.encoded_len());
                payload.encode_proto(&mut buf)?;
                ReqBody::from(buf.freeze())
            }
            Self::ProtoJson(payload) => ReqBody::from(payload.to_proto_json().map_err(EncodeError::ProtoJson)?),
            Self::Xml { root, payload } => ReqBody::from(payload.to_xml(root.as_deref())?),
            Self::Form(pairs) => ReqBody::from(serde_urlencoded::to_string(&pairs)?),
            Self::Reader(reader) => ReqBody::stream(reader),
        };

        trace!(content_type, payload_size = ?body.payload_size(), "encoded request body");
        Ok(EncodedBody { body, content_type })
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => f.debug_tuple("Binary").field(&bytes.len()).finish(),
            Self::Form(pairs) => f.debug_tuple("Form").field(pairs).finish(),
            Self::Xml { root, .. } => f.debug_struct("Xml").field("root", root).finish_non_exhaustive(),
            other => f.debug_tuple("Body").field(&other.kind()).finish(),
        }
    }
}

/// Encoder output: the bytes to send and the content type describing them.
#[derive(Debug)]
pub struct EncodedBody {
    pub body: ReqBody,
    pub content_type: &'static str,
}

/// Encodes an optional body, an absent one becomes an empty `text/html` payload.
pub fn encode_body(body: Option<Body>) -> Result<EncodedBody, EncodeError> {
    match body {
        Some(body) => body.encode(),
        None => Ok(EncodedBody { body: ReqBody::empty(), content_type: TEXT_HTML }),
    }
}

pub trait JsonPayload: Send + Sync {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send + Sync> JsonPayload for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

pub trait XmlPayload: Send + Sync {
    fn to_xml(&self, root: Option<&str>) -> Result<String, EncodeError>;
}

impl<T: Serialize + Send + Sync> XmlPayload for T {
    fn to_xml(&self, root: Option<&str>) -> Result<String, EncodeError> {
        match root {
            Some(root) => quick_xml::se::to_string_with_root(root, self),
            None => quick_xml::se::to_string(self),
        }
        .map_err(EncodeError::xml)
    }
}

pub trait ProtoPayload: Send + Sync {
    fn encoded_len(&self) -> usize;

    fn encode_proto(&self, buf: &mut BytesMut) -> Result<(), prost::EncodeError>;
}

impl<M: prost::Message> ProtoPayload for M {
    fn encoded_len(&self) -> usize {
        prost::Message::encoded_len(self)
    }

    fn encode_proto(&self, buf: &mut BytesMut) -> Result<(), prost::EncodeError> {
        prost::Message::encode(self, buf)
    }
}

pub trait ProtoJsonPayload: Send + Sync {
    /// Canonical protobuf JSON with default-valued fields written out.
    fn to_proto_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<M: ReflectMessage> ProtoJsonPayload for M {
    fn to_proto_json(&self) -> serde_json::Result<Vec<u8>> {
        let message = self.transcode_to_dynamic();
        let mut serializer = serde_json::Serializer::new(Vec::new());
        message.serialize_with_options(&mut serializer, &SerializeOptions::new().skip_default_fields(false))?;
        Ok(serializer.into_inner())
    }
}
