use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reasons a work unit reports; successes are reported under the status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureReason {
    /// The request could not be built (bad URL, header, method).
    RequestSetupError,
    HttpTimeout,
    /// Connect, transport or body read failure.
    HttpError,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("only http:// and https:// URLs are supported: {0}")]
    UnsupportedScheme(String),

    #[error("invalid http method: {0}")]
    Method(#[from] http::method::InvalidMethod),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

impl Error {
    #[must_use]
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InvalidUrl(_)
            | Self::UnsupportedScheme(_)
            | Self::Method(_)
            | Self::RequestBuild(_)
            | Self::HeaderName(_)
            | Self::HeaderValue(_) => FailureReason::RequestSetupError,
            Self::Timeout(_) => FailureReason::HttpTimeout,
            Self::Request(_) | Self::BodyRead(_) => FailureReason::HttpError,
        }
    }
}
