use std::borrow::Cow;
use std::sync::Arc;

use http::{Request, Response};
use micro_client_http::protocol::body::{ReqBody, RespBody};
use micro_client_http::transport::Transport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ClientBuilder, ClientConfig};
use crate::error::ClientError;
use crate::processor::{ResponseProcessor, StatusCheck, read_body};
use crate::request::RequestBuilder;
use crate::transport::{HttpClient, configure};

const DUMP_TARGET: &str = "micro_client::dump";

/// Executes requests through the configured transport.
///
/// Cloning is cheap and clones share the connection pool, a client can be
/// used from many tasks at once.
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    http: HttpClient,
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn builder() -> ClientBuilder {
        ClientConfig::builder()
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let http = configure(&config);
        Self { config: Arc::new(config), http }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.http.transport()
    }

    /// Starts a request, a shorthand for [`RequestBuilder::new`].
    pub fn request(&self, method: &str, url: &str) -> RequestBuilder {
        RequestBuilder::new().method(method).url(url)
    }

    /// Sends `request` and returns the response as is, retrying failed round
    /// trips per the transport retry policy. Non-2xx statuses are not failures
    /// here.
    pub async fn do_request(&self, cancel: &CancellationToken, request: Request<ReqBody>) -> Result<Response<RespBody>, ClientError> {
        let mut replay = Replay::new(request);
        self.config
            .transport_retry
            .run(cancel, "transport", |attempt| {
                let request = replay.next()?;
                debug!(attempt = attempt + 1, method = %request.method(), uri = %request.uri(), "round trip");
                Some(self.http.send(request))
            })
            .await
    }

    /// Sends `request` and hands the response to `processor`, [`StatusCheck`]
    /// when `None`. A failing processor fails the attempt, the whole
    /// exchange is retried per the execute retry policy.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        request: Request<ReqBody>,
        processor: Option<&dyn ResponseProcessor>,
    ) -> Result<(), ClientError> {
        let processor = processor.unwrap_or(&StatusCheck);
        let mut replay = Replay::new(request);

        self.config
            .execute_retry
            .run(cancel, "execute", |_| {
                let request = replay.next()?;
                Some(async move {
                    if self.config.debug {
                        dump_request(&request);
                    }
                    let mut response = self.do_request(cancel, request).await?;
                    if self.config.debug {
                        response = dump_response(response).await?;
                    }
                    processor.process(response).await
                })
            })
            .await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out the original request first, then copies of it as long as the
/// body is buffered.
struct Replay {
    original: Option<Request<ReqBody>>,
    template: Option<Request<ReqBody>>,
}

impl Replay {
    fn new(request: Request<ReqBody>) -> Self {
        let template = copy_request(&request);
        Self { original: Some(request), template }
    }

    fn next(&mut self) -> Option<Request<ReqBody>> {
        self.original.take().or_else(|| self.template.as_ref().and_then(copy_request))
    }
}

fn copy_request(request: &Request<ReqBody>) -> Option<Request<ReqBody>> {
    let mut copy = Request::new(request.body().try_clone()?);
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    Some(copy)
}

fn dump_request(request: &Request<ReqBody>) {
    let body = request.body().as_bytes().map_or(Cow::Borrowed("<stream>"), String::from_utf8_lossy);
    info!(
        target: DUMP_TARGET,
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        headers = ?request.headers(),
        body = %body,
        "request"
    );
}

/// Logs the response and puts the read body back.
async fn dump_response(response: Response<RespBody>) -> Result<Response<RespBody>, ClientError> {
    let (parts, body) = response.into_parts();
    let bytes = read_body(body).await?;
    info!(
        target: DUMP_TARGET,
        status = %parts.status,
        version = ?parts.version,
        headers = ?parts.headers,
        body = %String::from_utf8_lossy(&bytes),
        "response"
    );
    Ok(Response::from_parts(parts, RespBody::full(bytes)))
}
