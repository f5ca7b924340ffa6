use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{HOST, PROXY_AUTHORIZATION, USER_AGENT};
use http::uri::PathAndQuery;
use http::{HeaderValue, Request, Response, Uri};
use tracing::{debug, trace};

use crate::connection::HttpConnection;
use crate::protocol::body::{ReqBody, RespBody};
use crate::protocol::{HttpError, RequestHead};
use crate::transport::pool::{Pool, PoolConfig, PoolKey};
use crate::transport::tls::{self, TlsConfig, default_tls_config};
use crate::transport::{Dialer, Proxy, TcpDialer, Transport};

const DEFAULT_USER_AGENT: &str = concat!("micro-client/", env!("CARGO_PKG_VERSION"));

/// The default [`Transport`]: HTTP/1.1 over pooled connections.
///
/// Connections are opened through a [`Dialer`], wrapped in TLS for `https`
/// targets, optionally routed through a forward [`Proxy`], and pooled per
/// host with a cap on open connections.
pub struct HttpTransport {
    dialer: Arc<dyn Dialer>,
    tls: TlsConfig,
    tls_handshake_timeout: Option<Duration>,
    proxy: Option<Proxy>,
    pool: Pool,
    user_agent: HeaderValue,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    async fn connect(&self, key: &PoolKey) -> Result<HttpConnection, HttpError> {
        let https = key.is_https();
        let target = key.address();

        let mut io = match &self.proxy {
            Some(proxy) => {
                let mut io = self.dialer.dial(&proxy.address()).await.map_err(HttpError::connect)?;
                if https {
                    proxy.tunnel(&mut io, &target).await?;
                }
                io
            }
            None => self.dialer.dial(&target).await.map_err(HttpError::connect)?,
        };

        if https {
            io = tls::handshake(self.tls.clone(), &key.host, io, self.tls_handshake_timeout).await?;
        }

        Ok(HttpConnection::new(io))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("proxy", &self.proxy)
            .field("pool", &self.pool)
            .field("tls_handshake_timeout", &self.tls_handshake_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(&self, request: Request<ReqBody>) -> Result<Response<RespBody>, HttpError> {
        let (mut parts, body) = request.into_parts();
        let key = pool_key(&parts.uri)?;

        if !parts.headers.contains_key(HOST) {
            parts.headers.insert(HOST, host_header(&key)?);
        }
        if !parts.headers.contains_key(USER_AGENT) {
            parts.headers.insert(USER_AGENT, self.user_agent.clone());
        }

        match self.proxy.as_ref().filter(|_| !key.is_https()) {
            Some(proxy) => {
                if let Some(authorization) = proxy.authorization() {
                    parts.headers.entry(PROXY_AUTHORIZATION).or_insert_with(|| authorization.clone());
                }
            }
            None => parts.uri = origin_form(&parts.uri)?,
        }

        let mut connection = self.pool.checkout(&key, || self.connect(&key)).await?;
        trace!(method = %parts.method, host = %key, reused = connection.is_reused(), "send request");

        let (head, has_body) = connection.send_request(RequestHead::from(parts), body).await?;
        debug!(host = %key, status = %head.status(), has_body, "received response head");

        let body = if has_body {
            RespBody::streaming(connection)
        } else {
            drop(connection);
            RespBody::empty()
        };

        Ok(head.body(body))
    }
}

fn pool_key(uri: &Uri) -> Result<PoolKey, HttpError> {
    let scheme = match uri.scheme_str() {
        Some(scheme) if scheme.eq_ignore_ascii_case("http") => "http",
        Some(scheme) if scheme.eq_ignore_ascii_case("https") => "https",
        Some(scheme) => return Err(HttpError::invalid_uri(format!("unsupported scheme {scheme}"))),
        None => return Err(HttpError::invalid_uri(format!("missing scheme in {uri}"))),
    };

    let host = uri.host().filter(|host| !host.is_empty()).ok_or_else(|| HttpError::invalid_uri(format!("missing host in {uri}")))?;
    let port = uri.port_u16().unwrap_or(if scheme == "https" { 443 } else { 80 });

    Ok(PoolKey { scheme: scheme.to_owned(), host: host.to_owned(), port })
}

fn host_header(key: &PoolKey) -> Result<HeaderValue, HttpError> {
    let default_port = if key.is_https() { 443 } else { 80 };
    let value = if key.port == default_port { key.host.clone() } else { key.address() };
    HeaderValue::from_str(&value).map_err(HttpError::invalid_uri)
}

fn origin_form(uri: &Uri) -> Result<Uri, HttpError> {
    let path_and_query = uri.path_and_query().cloned().unwrap_or_else(|| PathAndQuery::from_static("/"));
    Uri::builder().path_and_query(path_and_query).build().map_err(HttpError::invalid_uri)
}

/// Builder of [`HttpTransport`].
#[derive(Default)]
pub struct HttpTransportBuilder {
    dialer: Option<Arc<dyn Dialer>>,
    tls: Option<TlsConfig>,
    tls_handshake_timeout: Option<Duration>,
    proxy: Option<Proxy>,
    pool: PoolConfig,
    user_agent: Option<HeaderValue>,
}

impl HttpTransportBuilder {
    pub fn dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn tls_config(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.tls_handshake_timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// `0` lifts the cap.
    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.pool.max_conns_per_host = max;
        self
    }

    pub fn max_idle_conns_per_host(mut self, max: usize) -> Self {
        self.pool.max_idle_per_host = max;
        self
    }

    pub fn user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn build(self) -> HttpTransport {
        HttpTransport {
            dialer: self.dialer.unwrap_or_else(|| Arc::new(TcpDialer::new()) as Arc<dyn Dialer>),
            tls: self.tls.unwrap_or_else(default_tls_config),
            tls_handshake_timeout: self.tls_handshake_timeout,
            proxy: self.proxy,
            pool: Pool::new(self.pool),
            user_agent: self.user_agent.unwrap_or_else(|| HeaderValue::from_static(DEFAULT_USER_AGENT)),
        }
    }
}

impl fmt::Debug for HttpTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportBuilder")
            .field("proxy", &self.proxy)
            .field("pool", &self.pool)
            .field("tls_handshake_timeout", &self.tls_handshake_timeout)
            .finish_non_exhaustive()
    }
}
