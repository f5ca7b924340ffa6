//! Request and response payloads of the client.
//!
//! - [`ReqBody`]: what the client writes. Buffered bodies are sent with
//!   `Content-Length` and can be replayed; reader bodies are streamed chunked
//!   and are one-shot.
//! - [`RespBody`]: what the client reads. Implements `http_body::Body` over
//!   the pooled connection that carried the response, so large payloads are
//!   never buffered unless the caller collects them.

mod req_body;
mod resp_body;

pub(crate) use req_body::BodySource;
pub use req_body::ReqBody;
pub use resp_body::RespBody;
