//! Core protocol types of the client transport.
//!
//! # Components
//!
//! - **Message Handling** ([`Message`], [`PayloadItem`], [`PayloadSize`]): the
//!   units exchanged with the codec, a head followed by payload chunks and EOF
//! - **Heads** ([`RequestHead`], [`ResponseHead`]): bodyless `http` messages
//!   with the framing helpers the connection driver needs
//! - **Bodies** ([`body`]): [`body::ReqBody`] for what is sent and
//!   [`body::RespBody`] for what is received
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
