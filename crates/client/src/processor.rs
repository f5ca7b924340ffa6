//! Response processors.
//!
//! A processor takes ownership of the response, body included, and turns it
//! into the outcome of the call. Dropping a body before its end closes the
//! underlying connection, reading it to the end hands the connection back to
//! the pool, so a processor never leaks either way.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::BodyExt;
use micro_client_http::protocol::body::RespBody;
use prost_reflect::{DynamicMessage, ReflectMessage};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{ClientError, DecodeError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError>;
}

/// Collects the whole body.
pub async fn read_body(body: RespBody) -> Result<Bytes, ClientError> {
    Ok(body.collect().await?.to_bytes())
}

/// Fails with [`ClientError::Status`] on anything but 2xx. Used when a call
/// names no processor.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCheck;

#[async_trait]
impl ResponseProcessor for StatusCheck {
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        status_check(response.status())
    }
}

fn status_check(status: StatusCode) -> Result<(), ClientError> {
    if status.is_success() { Ok(()) } else { Err(ClientError::Status { code: status.as_u16() }) }
}

pub struct ProcessorFn<F> {
    f: F,
}

impl<F> fmt::Debug for ProcessorFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorFn").finish_non_exhaustive()
    }
}

/// Wraps an async closure as a [`ResponseProcessor`].
pub fn processor_fn<F, Fut>(f: F) -> ProcessorFn<F>
where
    F: Fn(Response<RespBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ClientError>> + Send,
{
    ProcessorFn { f }
}

#[async_trait]
impl<F, Fut> ResponseProcessor for ProcessorFn<F>
where
    F: Fn(Response<RespBody>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ClientError>> + Send,
{
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        (self.f)(response).await
    }
}

/// Copies the body to an output, stdout unless told otherwise, and logs the
/// status.
pub struct DumpResponse {
    output: Mutex<Box<dyn Write + Send>>,
}

impl DumpResponse {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    pub fn with_output(output: impl Write + Send + 'static) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for DumpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DumpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpResponse").finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseProcessor for DumpResponse {
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        let (parts, body) = response.into_parts();
        let bytes = read_body(body).await?;

        {
            let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
            output.write_all(&bytes).and_then(|()| output.flush()).map_err(ClientError::processor)?;
        }

        info!(status = %parts.status, "dump response");
        status_check(parts.status)
    }
}

/// Service error envelope, `google.rpc.Status` without details.
#[derive(Clone, PartialEq, prost::Message, serde::Deserialize)]
struct Status {
    #[prost(int32, tag = "1")]
    #[serde(default)]
    code: i32,
    #[prost(string, tag = "2")]
    #[serde(default)]
    message: String,
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Structured { code: status.code, message: status.message }
    }
}

fn json_envelope(bytes: &[u8]) -> ClientError {
    match serde_json::from_slice::<Status>(bytes) {
        Ok(status) => status.into(),
        Err(e) => DecodeError::from(e).into(),
    }
}

fn proto_envelope(bytes: &[u8]) -> ClientError {
    match <Status as prost::Message>::decode(bytes) {
        Ok(status) => status.into(),
        Err(e) => DecodeError::from(e).into(),
    }
}

fn decode_proto_json<T: ReflectMessage + Default>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let message = DynamicMessage::deserialize(T::default().descriptor(), &mut deserializer)?;
    deserializer.end()?;
    Ok(message.transcode_to::<T>()?)
}

/// Decodes a 2xx JSON body into the target. Other statuses decode the
/// `{code, message}` envelope into [`ClientError::Structured`].
pub struct JsonResponse<'a, T> {
    target: Mutex<&'a mut T>,
}

impl<'a, T> JsonResponse<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        Self { target: Mutex::new(target) }
    }
}

impl<T> fmt::Debug for JsonResponse<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonResponse").finish_non_exhaustive()
    }
}

#[async_trait]
impl<'a, T> ResponseProcessor for JsonResponse<'a, T>
where
    T: DeserializeOwned + Send,
{
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        let (parts, body) = response.into_parts();
        let bytes = read_body(body).await?;

        if !parts.status.is_success() {
            debug!(status = %parts.status, "decode json error envelope");
            return Err(json_envelope(&bytes));
        }

        let value = serde_json::from_slice::<T>(&bytes).map_err(DecodeError::from)?;
        **self.target.lock().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }
}

/// Decodes a 2xx binary protobuf body into the target.
///
/// Other statuses carry a binary envelope, except `417 Expectation Failed`
/// which the gateway answers with a JSON envelope.
pub struct ProtoResponse<'a, T> {
    target: Mutex<&'a mut T>,
}

impl<'a, T> ProtoResponse<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        Self { target: Mutex::new(target) }
    }
}

impl<T> fmt::Debug for ProtoResponse<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoResponse").finish_non_exhaustive()
    }
}

#[async_trait]
impl<'a, T> ResponseProcessor for ProtoResponse<'a, T>
where
    T: prost::Message + Default,
{
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        let (parts, body) = response.into_parts();
        let bytes = read_body(body).await?;

        if parts.status == StatusCode::EXPECTATION_FAILED {
            return Err(json_envelope(&bytes));
        }
        if !parts.status.is_success() {
            debug!(status = %parts.status, "decode pb error envelope");
            return Err(proto_envelope(&bytes));
        }

        let value = T::decode(bytes).map_err(DecodeError::from)?;
        **self.target.lock().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }
}

/// Decodes a 2xx protobuf JSON body into the target, other statuses decode
/// the JSON envelope.
pub struct ProtoJsonResponse<'a, T> {
    target: Mutex<&'a mut T>,
}

impl<'a, T> ProtoJsonResponse<'a, T> {
    pub fn new(target: &'a mut T) -> Self {
        Self { target: Mutex::new(target) }
    }
}

impl<T> fmt::Debug for ProtoJsonResponse<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoJsonResponse").finish_non_exhaustive()
    }
}

#[async_trait]
impl<'a, T> ResponseProcessor for ProtoJsonResponse<'a, T>
where
    T: ReflectMessage + Default,
{
    async fn process(&self, response: Response<RespBody>) -> Result<(), ClientError> {
        let (parts, body) = response.into_parts();
        let bytes = read_body(body).await?;

        if !parts.status.is_success() {
            debug!(status = %parts.status, "decode pbjson error envelope");
            return Err(json_envelope(&bytes));
        }

        let value = decode_proto_json::<T>(&bytes)?;
        **self.target.lock().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }
}
