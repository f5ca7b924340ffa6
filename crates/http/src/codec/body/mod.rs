//! Payload framing for the client codec.
//!
//! Responses are read with [`PayloadDecoder`], which delegates to a length,
//! chunked or close-delimited strategy. Requests are written with
//! [`PayloadEncoder`], which delegates to a length or chunked strategy.

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
