//! Response head as produced by the client codec.
//!
//! Wraps a bodyless `http::Response<()>` and answers the framing questions the
//! connection needs: does the message carry a body, and may the connection be
//! reused afterwards.

use http::header::CONNECTION;
use http::{HeaderMap, Response, StatusCode, Version};

#[derive(Debug)]
pub struct ResponseHead {
    inner: Response<()>,
}

impl ResponseHead {
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    /// Attaches a body, converting the head into a full `Response<T>`.
    pub fn body<T>(self, body: T) -> Response<T> {
        self.inner.map(|()| body)
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// 1xx heads other than `101 Switching Protocols` precede the final response.
    pub fn is_informational(&self) -> bool {
        self.status().is_informational() && self.status() != StatusCode::SWITCHING_PROTOCOLS
    }

    /// Status codes that never carry a payload regardless of their headers.
    pub fn forbids_body(&self) -> bool {
        let status = self.status();
        status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    }

    /// HTTP/1.1 is persistent unless `Connection: close`, HTTP/1.0 only with
    /// an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let connection_has = |token: &str| {
            self.headers()
                .get_all(CONNECTION)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|value| value.trim().eq_ignore_ascii_case(token))
        };

        match self.version() {
            Version::HTTP_11 => !connection_has("close"),
            Version::HTTP_10 => connection_has("keep-alive"),
            _ => false,
        }
    }
}

impl From<Response<()>> for ResponseHead {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: Version, connection: Option<&str>) -> ResponseHead {
        let mut builder = Response::builder().version(version).status(StatusCode::OK);
        if let Some(connection) = connection {
            builder = builder.header(CONNECTION, connection);
        }
        builder.body(()).unwrap().into()
    }

    #[test]
    fn keep_alive_by_version() {
        assert!(head(Version::HTTP_11, None).is_keep_alive());
        assert!(!head(Version::HTTP_11, Some("close")).is_keep_alive());
        assert!(!head(Version::HTTP_11, Some("Upgrade, Close")).is_keep_alive());
        assert!(!head(Version::HTTP_10, None).is_keep_alive());
        assert!(head(Version::HTTP_10, Some("Keep-Alive")).is_keep_alive());
    }

    #[test]
    fn bodyless_status() {
        let no_content: ResponseHead = Response::builder().status(204).body(()).unwrap().into();
        assert!(no_content.forbids_body());
        let cont: ResponseHead = Response::builder().status(100).body(()).unwrap().into();
        assert!(cont.is_informational());
        assert!(!head(Version::HTTP_11, None).forbids_body());
    }
}
