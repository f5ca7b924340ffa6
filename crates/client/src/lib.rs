//! An HTTP client facade over the `micro-client-http` transport.
//!
//! A call goes through four steps:
//!
//! 1. [`RequestBuilder`] turns declarative options into an `http::Request`,
//!    encoding the [`Body`] by its kind
//! 2. [`Client`] sends it over an [`HttpClient`], configured from
//!    [`ClientConfig`], retrying per [`RetryPolicy`]
//! 3. the response goes to a [`ResponseProcessor`]
//! 4. the caller gets `Ok(())` or the last error
//!
//! # Example
//!
//! ```no_run
//! use micro_client::{Body, CancellationToken, Client, JsonResponse, RequestBuilder};
//! use serde_json::{Value, json};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::with_config(
//!     Client::builder().timeout(Duration::from_secs(5)).max_conns_per_host(4).execute_retries(3).build()?,
//! );
//!
//! let request = RequestBuilder::new()
//!     .method("post")
//!     .url("http://127.0.0.1:8080/echo")
//!     .query("lang", "rust")
//!     .bearer_auth("secret")
//!     .body(Body::json(json!({"a": "xxx"})))
//!     .build()?;
//!
//! let mut reply = Value::Null;
//! client.execute(&CancellationToken::new(), request, Some(&JsonResponse::new(&mut reply))).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```
//!
//! # Quirks
//!
//! - A body kind name nobody knows, or no body at all, maps to `text/html`
//!   in [`content_type_for`] and [`body::encode_body`].
//! - A malformed proxy url is ignored and connections go direct.
//! - Only the last error of a retried call is kept.

pub mod body;
pub mod grpc;

mod client;
mod config;
mod error;
mod processor;
mod request;
mod retry;
mod transport;

pub use body::Body;
pub use body::ContentKind;
pub use body::EncodedBody;
pub use body::content_type_for;

pub use client::Client;

pub use config::ClientBuilder;
pub use config::ClientConfig;
pub use config::DEFAULT_KEEPALIVE;
pub use config::DEFAULT_MAX_CONNS_PER_HOST;
pub use config::DEFAULT_MAX_IDLE_CONNS_PER_HOST;
pub use config::DEFAULT_TIMEOUT;
pub use config::DEFAULT_TLS_HANDSHAKE_TIMEOUT;

pub use error::BuildError;
pub use error::ClientError;
pub use error::ConfigError;
pub use error::DecodeError;
pub use error::EncodeError;

pub use processor::DumpResponse;
pub use processor::JsonResponse;
pub use processor::ProcessorFn;
pub use processor::ProtoJsonResponse;
pub use processor::ProtoResponse;
pub use processor::ResponseProcessor;
pub use processor::StatusCheck;
pub use processor::processor_fn;
pub use processor::read_body;

pub use request::RequestBuilder;
pub use request::Token;

pub use retry::Backoff;
pub use retry::RetryPolicy;

pub use transport::HttpClient;
pub use transport::configure;

pub use micro_client_http::protocol::HttpError;
pub use micro_client_http::protocol::body::{ReqBody, RespBody};
pub use micro_client_http::transport::{BoxedIo, Dialer, HttpTransport, Proxy, TcpDialer, TlsConfig, Transport, dial_fn};
pub use tokio_util::sync::CancellationToken;
