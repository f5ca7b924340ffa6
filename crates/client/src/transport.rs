use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{Request, Response};
use micro_client_http::protocol::body::{ReqBody, RespBody};
use micro_client_http::transport::{Dialer, HttpTransport, TcpDialer, Transport};
use tokio::time::Instant;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// A transport bound to an overall deadline per call.
///
/// The deadline covers the round trip and keeps running while the response
/// body is read.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self { transport, timeout: None }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn send(&self, request: Request<ReqBody>) -> Result<Response<RespBody>, ClientError> {
        let Some(timeout) = self.timeout else {
            return Ok(self.transport.round_trip(request).await?);
        };

        let deadline = Instant::now() + timeout;
        let mut response = tokio::time::timeout_at(deadline, self.transport.round_trip(request))
            .await
            .map_err(|_elapsed| ClientError::Timeout)??;
        response.body_mut().set_deadline(deadline);
        Ok(response)
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

/// Turns the settings into the client calls go through.
///
/// A configured [`HttpClient`] is used as is. Otherwise the transport is the
/// configured override or an [`HttpTransport`] built from the settings, and
/// it is bounded by the client timeout either way.
pub fn configure(config: &ClientConfig) -> HttpClient {
    if let Some(client) = &config.http_client {
        debug!("use configured http client");
        return client.clone();
    }

    let transport = match &config.transport {
        Some(transport) => {
            debug!("use configured transport");
            Arc::clone(transport)
        }
        None => Arc::new(build_transport(config)) as Arc<dyn Transport>,
    };

    HttpClient::from_arc(transport).timeout(config.timeout)
}

fn build_transport(config: &ClientConfig) -> HttpTransport {
    let dialer = config
        .dialer
        .clone()
        .unwrap_or_else(|| Arc::new(TcpDialer::new().connect_timeout(config.timeout).keepalive(config.keepalive)) as Arc<dyn Dialer>);

    let mut builder = HttpTransport::builder()
        .dialer(dialer)
        .tls_handshake_timeout(config.tls_handshake_timeout)
        .max_conns_per_host(config.max_conns_per_host)
        .max_idle_conns_per_host(config.max_idle_conns_per_host);

    if let Some(credential) = &config.credential {
        builder = builder.tls_config(Arc::clone(credential));
    }
    if let Some(proxy) = &config.proxy {
        builder = builder.proxy(proxy.clone());
    }

    let transport = builder.build();
    debug!(?transport, "built http transport");
    transport
}
