use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::HttpRequest;

/// Rewrites the request body before each call.
pub type PayloadTransform = Arc<dyn Fn(&Bytes) -> Bytes + Send + Sync + 'static>;

/// Replaces every occurrence of `placeholder` in a UTF-8 body with one fresh v4 UUID per call.
/// Bodies that are not valid UTF-8 pass through unchanged.
pub fn uuid_placeholder(placeholder: impl Into<String>) -> PayloadTransform {
    let placeholder = placeholder.into();
    Arc::new(move |body: &Bytes| {
        let Ok(text) = std::str::from_utf8(body) else {
            return body.clone();
        };
        if placeholder.is_empty() || !text.contains(placeholder.as_str()) {
            return body.clone();
        }
        let id = uuid::Uuid::new_v4().to_string();
        Bytes::from(text.replace(placeholder.as_str(), &id))
    })
}

/// Produces one request per work-unit invocation from a fixed template.
#[derive(Clone)]
pub struct RequestSupplier {
    method: http::Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Bytes,
    transform: Option<PayloadTransform>,
}

impl fmt::Debug for RequestSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSupplier")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl RequestSupplier {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            transform: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: PayloadTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn method(&self) -> &http::Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request(&self, timeout: Option<Duration>) -> HttpRequest {
        let body = match &self.transform {
            Some(transform) => transform(&self.body),
            None => self.body.clone(),
        };
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            timeout,
        }
    }
}
