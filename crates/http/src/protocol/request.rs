//! Request head as written by the client codec.
//!
//! The head wraps a bodyless `http::Request<()>`. By the time a head reaches the
//! codec its URI is already in wire form: origin-form (`/path?query`) for direct
//! connections and absolute-form when talking to a plain-http proxy.

use std::borrow::Cow;

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

#[derive(Debug)]
pub struct RequestHead {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHead {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHead {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHead {
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Methods whose requests conventionally carry a payload, an empty one is
    /// announced with `content-length: 0`.
    pub fn expects_body(&self) -> bool {
        matches!(self.method(), &Method::POST | &Method::PUT | &Method::PATCH)
    }

    /// The request target as it appears on the request line.
    pub fn target(&self) -> Cow<'_, str> {
        let uri = self.uri();
        if uri.scheme().is_some() {
            return Cow::Owned(uri.to_string());
        }
        match uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => Cow::Borrowed(pq.as_str()),
            _ => Cow::Borrowed("/"),
        }
    }
}

impl From<Parts> for RequestHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHead {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_target() {
        let head = RequestHead::from(Request::get("/index.html?a=1").body(()).unwrap());
        assert_eq!(head.target(), "/index.html?a=1");
        assert!(!head.expects_body());
    }

    #[test]
    fn absolute_form_target() {
        let head = RequestHead::from(Request::get("http://example.com:8080/a?b=c").body(()).unwrap());
        assert_eq!(head.target(), "http://example.com:8080/a?b=c");
    }

    #[test]
    fn post_expects_body() {
        let head = RequestHead::from(Request::post("/").body(()).unwrap());
        assert!(head.expects_body());
    }
}
