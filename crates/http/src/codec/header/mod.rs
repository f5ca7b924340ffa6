//! Head framing for the client codec.
//!
//! - [`HeaderEncoder`]: writes the request line and header block, keeping the
//!   framing headers consistent with the payload being sent
//! - [`HeaderDecoder`]: parses the status line and header block of a response
//!   and decides how its payload is delimited

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
