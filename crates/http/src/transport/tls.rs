use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::protocol::HttpError;
use crate::transport::BoxedIo;

pub type TlsConfig = Arc<ClientConfig>;

/// Client TLS settings trusting the Mozilla root store.
pub fn default_tls_config() -> TlsConfig {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(ClientConfig::builder().with_root_certificates(roots).with_no_client_auth())
}

/// Runs the TLS handshake for `host` over an established stream.
pub(crate) async fn handshake(
    config: TlsConfig,
    host: &str,
    io: BoxedIo,
    timeout: Option<Duration>,
) -> Result<BoxedIo, HttpError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let server_name = ServerName::try_from(host.to_owned()).map_err(HttpError::tls)?;

    let connect = TlsConnector::from(config).connect(server_name, io);
    let stream = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect).await.map_err(|_elapsed| HttpError::Timeout)?,
        None => connect.await,
    }
    .map_err(HttpError::tls)?;

    debug!(host, "tls handshake finished");
    Ok(Box::new(stream))
}
