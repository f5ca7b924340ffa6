use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Any byte stream a connection can run over.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedIo = Box<dyn Io>;

/// Opens the raw stream for a connection.
///
/// `addr` is `host:port`, either of the target or of the proxy in front of it.
/// TLS and proxy tunnels are layered on top by the transport.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, addr: &str) -> io::Result<BoxedIo>;
}

/// Plain TCP dialer with a connect timeout and TCP keep-alive probes.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
    keepalive: Option<Duration>,
}

impl TcpDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Idle time before the first keep-alive probe.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive = Some(interval);
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> io::Result<BoxedIo> {
        let connect = TcpStream::connect(addr);
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_elapsed| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {addr} timed out")))??,
            None => connect.await?,
        };

        stream.set_nodelay(true)?;
        if let Some(interval) = self.keepalive {
            SockRef::from(&stream).set_tcp_keepalive(&TcpKeepalive::new().with_time(interval))?;
        }

        debug!(addr, local_addr = ?stream.local_addr().ok(), "dialed tcp connection");
        Ok(Box::new(stream))
    }
}

/// Adapts an async closure into a [`Dialer`].
pub struct DialFn<F> {
    f: F,
}

impl<F> fmt::Debug for DialFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialFn").finish_non_exhaustive()
    }
}

/// Creates a [`Dialer`] from a closure taking the `host:port` to connect to.
///
/// ```no_run
/// use micro_client_http::transport::{BoxedIo, dial_fn};
///
/// let dialer = dial_fn(|addr: String| async move {
///     let stream = tokio::net::TcpStream::connect(addr).await?;
///     Ok(Box::new(stream) as BoxedIo)
/// });
/// ```
pub fn dial_fn<F, Fut>(f: F) -> DialFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<BoxedIo>> + Send,
{
    DialFn { f }
}

#[async_trait]
impl<F, Fut> Dialer for DialFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = io::Result<BoxedIo>> + Send,
{
    async fn dial(&self, addr: &str) -> io::Result<BoxedIo> {
        (self.f)(addr.to_owned()).await
    }
}
