//! Declarative request construction.
//!
//! Setters only record what was asked for, [`RequestBuilder::build`] does all
//! the parsing and encoding in a fixed order:
//!
//! 1. url (literal url, then url part overrides), `url required` if none
//! 2. query parameters appended to the literal query
//! 3. body encoding and its `Content-Type`
//! 4. explicit headers, replacing same-named headers set before them
//! 5. cookies
//! 6. basic auth, then bearer auth which wins over basic auth
//!
//! Repeated [`header`](RequestBuilder::header) calls for the same name
//! accumulate values in call order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use micro_client_http::protocol::body::ReqBody;
use percent_encoding::percent_decode_str;
use tracing::trace;
use url::Url;

use crate::body::Body;
use crate::error::{BuildError, ClientError};

/// Source of a bearer token.
#[derive(Clone)]
pub enum Token {
    Static(String),
    /// Called once per [`RequestBuilder::build`].
    Func(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Token {
    fn resolve(&self) -> String {
        match self {
            Self::Static(token) => token.clone(),
            Self::Func(f) => f(),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("Token::Static(..)"),
            Self::Func(_) => f.write_str("Token::Func(..)"),
        }
    }
}

#[derive(Default)]
pub struct RequestBuilder {
    method: Option<String>,
    url: Option<String>,
    scheme: Option<String>,
    host: Option<String>,
    path: Option<String>,
    user: Option<(String, Option<String>)>,
    fragment: Option<String>,
    query: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    basic_auth: Option<(String, String)>,
    token: Option<Token>,
    body: Option<Body>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized to upper case, `GET` when never set.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Defaults to `http` when the url is composed from parts.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// `host` or `host:port`
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some((user.into(), None));
        self
    }

    pub fn user_password(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some((user.into(), Some(password.into())));
        self
    }

    /// Kept on the url, never sent.
    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// A repeated name overwrites the earlier value.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Token::Static(token.into()));
        self
    }

    pub fn bearer_auth_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.token = Some(Token::Func(Arc::new(f)));
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    /// Materializes the request, encoding the body.
    pub fn build(self) -> Result<Request<ReqBody>, ClientError> {
        let mut url = self.target_url()?;

        let method = match &self.method {
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(BuildError::from)?,
            None => Method::GET,
        };

        let mut headers = HeaderMap::new();
        let body = match self.body {
            Some(body) => {
                let encoded = body.encode()?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(encoded.content_type));
                encoded.body
            }
            None => ReqBody::empty(),
        };

        headers.extend(explicit_headers(&self.headers)?);

        if !self.cookies.is_empty() {
            let cookies = self.cookies.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("; ");
            let cookie = match headers.get(COOKIE).and_then(|value| value.to_str().ok()) {
                Some(existing) => format!("{existing}; {cookies}"),
                None => cookies,
            };
            headers.insert(COOKIE, header_value(COOKIE.as_str(), &cookie)?);
        }

        let credentials = match &self.basic_auth {
            Some((username, password)) => Some((username.clone(), password.clone())),
            None if !url.username().is_empty() => Some((decode(url.username()), decode(url.password().unwrap_or_default()))),
            None => None,
        };
        if let Some((username, password)) = credentials {
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            headers.insert(AUTHORIZATION, header_value(AUTHORIZATION.as_str(), &format!("Basic {encoded}"))?);
        }

        if let Some(token) = &self.token {
            let value = format!("Bearer {}", token.resolve());
            headers.insert(AUTHORIZATION, header_value(AUTHORIZATION.as_str(), &value)?);
        }

        url.set_fragment(None);
        strip_credentials(&mut url)?;
        let uri = Uri::try_from(url.as_str()).map_err(|e| BuildError::from(http::Error::from(e)))?;

        let mut request = Request::builder().method(method).uri(uri).body(body).map_err(BuildError::from)?;
        *request.headers_mut() = headers;

        trace!(method = %request.method(), uri = %request.uri(), "built request");
        Ok(request)
    }

    fn target_url(&self) -> Result<Url, BuildError> {
        let mut url = match (self.url.as_deref().filter(|url| !url.is_empty()), &self.host) {
            (Some(raw), _) => parse_url(raw)?,
            (None, Some(host)) => parse_url(&format!("{}://{host}", self.scheme.as_deref().unwrap_or("http")))?,
            (None, None) => return Err(BuildError::MissingUrl),
        };

        if let Some(scheme) = &self.scheme {
            url.set_scheme(scheme).map_err(|()| BuildError::invalid_url_part("scheme", scheme))?;
        }

        if self.url.is_some()
            && let Some(host) = &self.host
        {
            let authority = parse_url(&format!("{}://{host}", url.scheme()))?;
            url.set_host(authority.host_str()).map_err(|source| BuildError::InvalidUrl { url: host.clone(), source })?;
            url.set_port(authority.port()).map_err(|()| BuildError::invalid_url_part("host", host))?;
        }

        if let Some(path) = &self.path {
            url.set_path(path);
        }

        if let Some((user, password)) = &self.user {
            url.set_username(user).map_err(|()| BuildError::invalid_url_part("user", user))?;
            url.set_password(password.as_deref()).map_err(|()| BuildError::invalid_url_part("password", "***"))?;
        }

        if let Some(fragment) = &self.fragment {
            url.set_fragment(Some(fragment));
        }

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }

        Ok(url)
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("host", &self.host)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

fn parse_url(raw: &str) -> Result<Url, BuildError> {
    Url::parse(raw).map_err(|source| BuildError::InvalidUrl { url: raw.to_owned(), source })
}

/// Url userinfo is percent-encoded, Basic auth carries it decoded.
fn decode(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().into_owned()
}

fn strip_credentials(url: &mut Url) -> Result<(), BuildError> {
    if url.username().is_empty() && url.password().is_none() {
        return Ok(());
    }
    url.set_username("").map_err(|()| BuildError::invalid_url_part("user", ""))?;
    url.set_password(None).map_err(|()| BuildError::invalid_url_part("password", ""))
}

fn explicit_headers(headers: &[(String, String)]) -> Result<HeaderMap, BuildError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| BuildError::invalid_header(name, e))?;
        map.append(header_name, header_value(name, value)?);
    }
    Ok(map)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(value).map_err(|e| BuildError::invalid_header(name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn header<'a>(request: &'a Request<ReqBody>, name: &str) -> Option<&'a str> {
        request.headers().get(name).map(|value| value.to_str().unwrap())
    }

    #[test]
    fn missing_url_fails() {
        let result = RequestBuilder::new()
            .method("post")
            .path("/a")
            .query("x", "1")
            .header("X-Trace", "1")
            .bearer_auth("token")
            .body(Body::text("hello"))
            .build();
        assert!(matches!(result, Err(ClientError::Build(BuildError::MissingUrl))));

        let result = RequestBuilder::new().url("").build();
        assert!(matches!(result, Err(ClientError::Build(BuildError::MissingUrl))));
    }

    #[test]
    fn invalid_url_fails_at_build() {
        let result = RequestBuilder::new().url("http://[::1").build();
        assert!(matches!(result, Err(ClientError::Build(BuildError::InvalidUrl { .. }))));
    }

    #[test]
    fn query_is_additive() {
        let request = RequestBuilder::new().url("http://h/p?x=1").query("y", "2").build().unwrap();
        assert_eq!(request.uri().to_string(), "http://h/p?x=1&y=2");
        assert_eq!(request.method(), Method::GET);
    }

    #[test]
    fn url_from_parts() {
        let request = RequestBuilder::new()
            .method("put")
            .host("example.com:8080")
            .path("/v1/items")
            .fragment("top")
            .query("b", "2")
            .query("a", "1")
            .query("b", "3")
            .build()
            .unwrap();
        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.uri().to_string(), "http://example.com:8080/v1/items?a=1&b=3");
    }

    #[test]
    fn parts_override_literal_url() {
        let request = RequestBuilder::new()
            .url("http://old.example.com/a?keep=1")
            .scheme("https")
            .host("new.example.com")
            .path("/b")
            .build()
            .unwrap();
        assert_eq!(request.uri().to_string(), "https://new.example.com/b?keep=1");
    }

    #[test]
    fn explicit_header_overrides_content_type() {
        let request = RequestBuilder::new()
            .url("http://h/")
            .body(Body::json(serde_json::json!({"a": 1})))
            .header("Content-Type", "application/vnd.api+json")
            .build()
            .unwrap();
        assert_eq!(header(&request, "content-type"), Some("application/vnd.api+json"));
        assert_eq!(request.body().as_bytes(), Some(&br#"{"a":1}"#[..]));
    }

    #[test]
    fn headers_accumulate() {
        let request = RequestBuilder::new().url("http://h/").header("Accept", "text/plain").header("accept", "text/html").build().unwrap();
        let values: Vec<_> = request.headers().get_all("accept").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, ["text/plain", "text/html"]);
        assert!(request.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn cookies_in_order() {
        let request = RequestBuilder::new()
            .url("http://h/")
            .header("Cookie", "a=0")
            .cookie("b", "1")
            .cookie("c", "2")
            .build()
            .unwrap();
        assert_eq!(header(&request, "cookie"), Some("a=0; b=1; c=2"));
    }

    #[test]
    fn no_auth_header_without_credentials() {
        let request = RequestBuilder::new().url("http://h/").build().unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn basic_auth() {
        let request = RequestBuilder::new().url("http://h/").basic_auth("user", "pass").build().unwrap();
        assert_eq!(header(&request, "authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn url_credentials_become_basic_auth() {
        let request = RequestBuilder::new().url("http://user:pass@h/p#frag").build().unwrap();
        assert_eq!(header(&request, "authorization"), Some("Basic dXNlcjpwYXNz"));
        assert_eq!(request.uri().to_string(), "http://h/p");

        let request = RequestBuilder::new().host("h").user_password("user", "pass").build().unwrap();
        assert_eq!(header(&request, "authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn url_credentials_are_sent_decoded() {
        // base64 of "a@b.com:p:w d"
        let expected = Some("Basic YUBiLmNvbTpwOncgZA==");

        let request = RequestBuilder::new().host("h").user_password("a@b.com", "p:w d").build().unwrap();
        assert_eq!(header(&request, "authorization"), expected);

        let request = RequestBuilder::new().url("http://a%40b.com:p%3Aw%20d@h/").build().unwrap();
        assert_eq!(header(&request, "authorization"), expected);
        assert_eq!(request.uri().to_string(), "http://h/");
    }

    #[test]
    fn bearer_wins_over_basic() {
        let request = RequestBuilder::new().url("http://h/").basic_auth("user", "pass").bearer_auth("abc").build().unwrap();
        assert_eq!(header(&request, "authorization"), Some("Bearer abc"));
    }

    #[test]
    fn bearer_fn_called_once_per_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let builder = || {
            let counter = counter.clone();
            RequestBuilder::new().url("http://h/").bearer_auth_fn(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("token-{n}")
            })
        };

        let first = builder().build().unwrap();
        assert_eq!(header(&first, "authorization"), Some("Bearer token-1"));
        let second = builder().build().unwrap();
        assert_eq!(header(&second, "authorization"), Some("Bearer token-2"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn encode_error_surfaces() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not json");
        let result = RequestBuilder::new().url("http://h/").body(Body::json(map)).build();
        assert!(matches!(result, Err(ClientError::Encode(_))));
    }

    #[test]
    fn invalid_method() {
        let result = RequestBuilder::new().url("http://h/").method("GE T").build();
        assert!(matches!(result, Err(ClientError::Build(BuildError::InvalidMethod { .. }))));
    }
}
