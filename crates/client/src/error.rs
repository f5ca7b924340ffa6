use std::error::Error;

use micro_client_http::protocol::HttpError;
use thiserror::Error;

/// The request could not be assembled, nothing was sent.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("url required")]
    MissingUrl,

    #[error("invalid url {url}: {source}")]
    InvalidUrl { url: String, source: url::ParseError },

    #[error("invalid url {part}: {value}")]
    InvalidUrlPart { part: &'static str, value: String },

    #[error("invalid method: {source}")]
    InvalidMethod {
        #[from]
        source: http::method::InvalidMethod,
    },

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid request: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
}

impl BuildError {
    pub fn invalid_url_part<S: ToString>(part: &'static str, value: S) -> Self {
        Self::InvalidUrlPart { part, value: value.to_string() }
    }

    pub fn invalid_header<N: ToString, S: ToString>(name: N, reason: S) -> Self {
        Self::InvalidHeader { name: name.to_string(), reason: reason.to_string() }
    }
}

/// A request body could not be serialized.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("json marshal failed: {0}")]
    Json(#[source] serde_json::Error),

    #[error("pbjson marshal failed: {0}")]
    ProtoJson(#[source] serde_json::Error),

    #[error("pb marshal failed: {0}")]
    Proto(#[from] prost::EncodeError),

    #[error("xml marshal failed: {reason}")]
    Xml { reason: String },

    #[error("form encode failed: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),
}

impl EncodeError {
    pub fn xml<S: ToString>(str: S) -> Self {
        Self::Xml { reason: str.to_string() }
    }
}

/// A response body did not match the expected format.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pb decode failed: {0}")]
    Proto(#[from] prost::DecodeError),
}

/// The client settings are inconsistent.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },
}

/// The single terminal error of a call.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("transport error: {0}")]
    Transport(#[source] HttpError),

    #[error("unexpected status code {code}")]
    Status { code: u16 },

    #[error("service error {code}: {message}")]
    Structured { code: i32, message: String },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("request body is a stream and can't be replayed")]
    NotReplayable,

    #[error("processor error: {0}")]
    Processor(#[source] Box<dyn Error + Send + Sync>),
}

impl ClientError {
    pub fn processor<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Processor(e.into())
    }

    /// HTTP status or service code carried by the error.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            Self::Status { code } => Some(i32::from(*code)),
            Self::Structured { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<HttpError> for ClientError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout => Self::Timeout,
            e => Self::Transport(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeout_is_client_timeout() {
        assert!(ClientError::from(HttpError::Timeout).is_timeout());
        assert!(matches!(ClientError::from(HttpError::proxy("refused")), ClientError::Transport(_)));
    }

    #[test]
    fn status_code_of_errors() {
        assert_eq!(ClientError::Status { code: 404 }.status_code(), Some(404));
        assert_eq!(ClientError::Structured { code: 5, message: "not found".into() }.status_code(), Some(5));
        assert_eq!(ClientError::Cancelled.status_code(), None);
        assert_eq!(BuildError::MissingUrl.to_string(), "url required");
    }
}
