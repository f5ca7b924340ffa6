//! Client settings.
//!
//! [`ClientBuilder`] collects the options, [`ClientBuilder::build`] validates
//! them once and produces an immutable [`ClientConfig`]. Two override levels
//! exist: a full [`HttpClient`] replaces everything transport related, a bare
//! [`Transport`] replaces the connection handling but keeps the client timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use micro_client_http::transport::{Dialer, Proxy, TlsConfig, Transport};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::transport::HttpClient;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 32;
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 8;

#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) timeout: Duration,
    pub(crate) keepalive: Duration,
    pub(crate) tls_handshake_timeout: Duration,
    pub(crate) max_conns_per_host: usize,
    pub(crate) max_idle_conns_per_host: usize,
    pub(crate) credential: Option<TlsConfig>,
    pub(crate) dialer: Option<Arc<dyn Dialer>>,
    pub(crate) proxy: Option<Proxy>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) http_client: Option<HttpClient>,
    pub(crate) transport_retry: RetryPolicy,
    pub(crate) execute_retry: RetryPolicy,
    pub(crate) debug: bool,
}

impl ClientConfig {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    pub fn tls_handshake_timeout(&self) -> Duration {
        self.tls_handshake_timeout
    }

    /// `0` means unbounded.
    pub fn max_conns_per_host(&self) -> usize {
        self.max_conns_per_host
    }

    pub fn max_idle_conns_per_host(&self) -> usize {
        self.max_idle_conns_per_host
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    pub fn transport_retry(&self) -> &RetryPolicy {
        &self.transport_retry
    }

    pub fn execute_retry(&self) -> &RetryPolicy {
        &self.execute_retry
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
            max_idle_conns_per_host: DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            credential: None,
            dialer: None,
            proxy: None,
            transport: None,
            http_client: None,
            transport_retry: RetryPolicy::once(),
            execute_retry: RetryPolicy::once(),
            debug: false,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .field("keepalive", &self.keepalive)
            .field("tls_handshake_timeout", &self.tls_handshake_timeout)
            .field("max_conns_per_host", &self.max_conns_per_host)
            .field("max_idle_conns_per_host", &self.max_idle_conns_per_host)
            .field("custom_credential", &self.credential.is_some())
            .field("custom_dialer", &self.dialer.is_some())
            .field("proxy", &self.proxy)
            .field("custom_transport", &self.transport.is_some())
            .field("custom_client", &self.http_client.is_some())
            .field("transport_retry", &self.transport_retry)
            .field("execute_retry", &self.execute_retry)
            .field("debug", &self.debug)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    proxy: Option<String>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Bounds the round trip and reading the response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn keepalive(mut self, keepalive: Duration) -> Self {
        self.config.keepalive = keepalive;
        self
    }

    pub fn tls_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.tls_handshake_timeout = timeout;
        self
    }

    /// Attempts of the bare round trip, only counts above 1 enable retries.
    pub fn do_retries(mut self, retries: usize) -> Self {
        self.config.transport_retry = RetryPolicy::attempts(retries);
        self
    }

    /// Attempts of round trip plus response processing, only counts above 1 enable retries.
    pub fn execute_retries(mut self, retries: usize) -> Self {
        self.config.execute_retry = RetryPolicy::attempts(retries);
        self
    }

    pub fn transport_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.transport_retry = policy;
        self
    }

    pub fn execute_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.execute_retry = policy;
        self
    }

    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.config.max_conns_per_host = max;
        self
    }

    pub fn max_idle_conns_per_host(mut self, max: usize) -> Self {
        self.config.max_idle_conns_per_host = max;
        self
    }

    pub fn credential(mut self, tls: TlsConfig) -> Self {
        self.config.credential = Some(tls);
        self
    }

    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.config.dialer = Some(Arc::new(dialer));
        self
    }

    /// `http://[user[:password]@]host[:port]`, a malformed url is ignored.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Replaces the connection handling, timeout still applies, connection
    /// limits, dialer, credential and proxy are ignored.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.config.transport = Some(Arc::new(transport));
        self
    }

    /// Replaces everything transport related.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.config.http_client = Some(client);
        self
    }

    /// Dumps requests and responses to the `micro_client::dump` log target.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let mut config = self.config;

        for (name, duration) in
            [("timeout", config.timeout), ("keepalive", config.keepalive), ("tls handshake timeout", config.tls_handshake_timeout)]
        {
            if duration.is_zero() {
                return Err(ConfigError::ZeroDuration { name });
            }
        }

        config.proxy = self.proxy.as_deref().filter(|proxy| !proxy.is_empty()).and_then(Proxy::parse);

        Ok(config)
    }
}
