use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::{Error, HttpRequest, HttpResponse, Result};

/// Keeps an unreachable target from stalling a worker for the OS-level connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

const MAX_IDLE_PER_HOST: usize = 1_000;

/// Pooled HTTP/1 client shared by every invocation of a work unit.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .build(https_connector);

        Self { inner }
    }

    /// Sends `req` and drains the response body. The timeout covers the whole exchange.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let req = build_request(req)?;

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exchange(req))
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => self.exchange(req).await,
        }
    }

    async fn exchange(&self, req: Request<Full<Bytes>>) -> Result<HttpResponse> {
        let res = self.inner.request(req).await?;
        let (parts, body) = res.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            body_len: body.len() as u64,
        })
    }
}

pub(crate) fn build_request(req: HttpRequest) -> Result<Request<Full<Bytes>>> {
    let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::UnsupportedScheme(req.url));
    }

    let uri: hyper::Uri = req
        .url
        .parse()
        .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

    let mut builder = Request::builder().method(req.method).uri(uri);
    for (k, v) in req.headers {
        let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
        let value = http::header::HeaderValue::from_str(&v)?;
        builder = builder.header(name, value);
    }

    Ok(builder.body(Full::new(req.body))?)
}
