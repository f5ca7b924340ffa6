//! Client connection handling.
//!
//! [`HttpConnection`] drives one HTTP/1.1 connection over any [`BoxedIo`]
//! stream: plain TCP, TLS, or a tunnel through a proxy. It writes requests
//! through the client codec, skips informational responses, exposes the
//! response payload as a pull-based stream, and tracks whether the connection
//! can go back to its pool.
//!
//! [`BoxedIo`]: crate::transport::BoxedIo

mod http_connection;

pub use http_connection::HttpConnection;
