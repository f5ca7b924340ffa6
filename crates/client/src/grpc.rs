//! Calls to gRPC services exposed through an HTTP/JSON gateway.
//!
//! Requests are POSTs carrying the protobuf JSON mapping of the message, the
//! path is derived from a [`GrpcMethod`] by an injected [`UriFormat`].

use std::fmt;
use std::sync::Arc;

use prost_reflect::ReflectMessage;
use tokio_util::sync::CancellationToken;

use crate::body::Body;
use crate::client::Client;
use crate::error::ClientError;
use crate::processor::ProtoJsonResponse;
use crate::request::RequestBuilder;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrpcMethod {
    pub version: String,
    pub package: String,
    pub service: String,
    pub method: String,
}

impl GrpcMethod {
    pub fn new(version: impl Into<String>, package: impl Into<String>, service: impl Into<String>, method: impl Into<String>) -> Self {
        Self { version: version.into(), package: package.into(), service: service.into(), method: method.into() }
    }
}

/// Maps a method to the request path on the gateway.
pub trait UriFormat: Send + Sync {
    fn format(&self, method: &GrpcMethod) -> String;
}

/// `/{version}/{package}.{service}/{method}`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUriFormat;

impl UriFormat for DefaultUriFormat {
    fn format(&self, method: &GrpcMethod) -> String {
        format!("/{}/{}.{}/{}", method.version, method.package, method.service, method.method)
    }
}

pub struct UriFormatFn<F> {
    f: F,
}

impl<F> fmt::Debug for UriFormatFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UriFormatFn").finish_non_exhaustive()
    }
}

pub fn uri_format_fn<F>(f: F) -> UriFormatFn<F>
where
    F: Fn(&GrpcMethod) -> String + Send + Sync,
{
    UriFormatFn { f }
}

impl<F> UriFormat for UriFormatFn<F>
where
    F: Fn(&GrpcMethod) -> String + Send + Sync,
{
    fn format(&self, method: &GrpcMethod) -> String {
        (self.f)(method)
    }
}

#[derive(Clone)]
pub struct GrpcGateway {
    client: Client,
    base_url: String,
    uri_format: Arc<dyn UriFormat>,
}

impl GrpcGateway {
    /// `base_url` is scheme and authority, e.g. `http://127.0.0.1:8080`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { client, base_url, uri_format: Arc::new(DefaultUriFormat) }
    }

    pub fn uri_format(mut self, uri_format: impl UriFormat + 'static) -> Self {
        self.uri_format = Arc::new(uri_format);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn url(&self, method: &GrpcMethod) -> String {
        format!("{}{}", self.base_url, self.uri_format.format(method))
    }

    /// A POST carrying `message` as protobuf JSON, open for more options.
    pub fn request<M: ReflectMessage + 'static>(&self, method: &GrpcMethod, message: M) -> RequestBuilder {
        RequestBuilder::new().method("POST").url(self.url(method)).body(Body::proto_json(message))
    }

    /// Invokes `method` and decodes the reply into `response`.
    pub async fn call<Req, Resp>(
        &self,
        cancel: &CancellationToken,
        method: &GrpcMethod,
        request: Req,
        response: &mut Resp,
    ) -> Result<(), ClientError>
    where
        Req: ReflectMessage + 'static,
        Resp: ReflectMessage + Default,
    {
        let request = self.request(method, request).build()?;
        let processor = ProtoJsonResponse::new(response);
        self.client.execute(cancel, request, Some(&processor)).await
    }
}

impl fmt::Debug for GrpcGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrpcGateway").field("client", &self.client).field("base_url", &self.base_url).finish_non_exhaustive()
    }
}
