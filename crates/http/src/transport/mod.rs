//! Everything between a finished `http::Request` and the first response byte.
//!
//! [`Transport`] is the seam the client facade talks to. [`HttpTransport`] is
//! the default implementation, assembled from:
//!
//! - [`Dialer`]: opens the raw byte stream, [`TcpDialer`] by default
//! - [`TlsConfig`]: rustls settings used for `https` targets
//! - [`Proxy`]: optional forward proxy, absolute-form for `http` and a
//!   `CONNECT` tunnel for `https`
//! - [`Pool`]: keep-alive connections per host with a cap on open connections

use std::sync::Arc;

use async_trait::async_trait;
use http::{Request, Response};

use crate::protocol::HttpError;
use crate::protocol::body::{ReqBody, RespBody};

mod dialer;
pub use dialer::BoxedIo;
pub use dialer::DialFn;
pub use dialer::Dialer;
pub use dialer::Io;
pub use dialer::TcpDialer;
pub use dialer::dial_fn;

mod tls;
pub use tls::TlsConfig;
pub use tls::default_tls_config;

mod proxy;
pub use proxy::Proxy;

mod pool;
pub use pool::Pool;
pub use pool::PoolConfig;
pub use pool::PoolKey;
pub use pool::PooledConnection;

mod http_transport;
pub use http_transport::HttpTransport;
pub use http_transport::HttpTransportBuilder;

/// Sends one request and resolves once the response head arrived.
///
/// The response body streams from the connection afterwards.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: Request<ReqBody>) -> Result<Response<RespBody>, HttpError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn round_trip(&self, request: Request<ReqBody>) -> Result<Response<RespBody>, HttpError> {
        (**self).round_trip(request).await
    }
}
