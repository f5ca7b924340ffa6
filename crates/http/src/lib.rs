//! The HTTP/1.1 client transport under `micro-client`.
//!
//! This crate turns an `http::Request` into bytes on a pooled connection and
//! streams the response back as an `http_body::Body`. It knows nothing about
//! content types, retries or response handling, those live in the facade.
//!
//! # Architecture
//!
//! - [`protocol`]: heads, bodies, framing and error types
//! - [`codec`]: the client direction of the HTTP/1.1 wire format, a request
//!   encoder paired with a response decoder
//! - [`connection`]: drives one request/response exchange at a time over a
//!   framed byte stream
//! - [`transport`]: dialing, TLS, proxies and the connection pool behind the
//!   [`transport::Transport`] trait
//!
//! # Example
//!
//! ```no_run
//! use http::Request;
//! use http_body_util::BodyExt;
//! use micro_client_http::protocol::body::ReqBody;
//! use micro_client_http::transport::{HttpTransport, Transport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let transport = HttpTransport::builder().max_conns_per_host(4).build();
//! let request = Request::get("http://127.0.0.1:8080/hello").body(ReqBody::empty())?;
//!
//! let response = transport.round_trip(request).await?;
//! let body = response.into_body().collect().await?.to_bytes();
//! println!("{}", String::from_utf8_lossy(&body));
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! - HTTP/1.1 only, no pipelining
//! - Response heads are limited to 8KB and 64 headers

pub mod codec;
pub mod connection;
pub mod protocol;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
