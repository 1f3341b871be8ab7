#![forbid(unsafe_code)]

mod client;
mod error;
mod supplier;
mod types;
mod unit;

pub use client::{DEFAULT_CONNECT_TIMEOUT, HttpClient};
pub use error::{Error, FailureReason, Result};
pub use supplier::{PayloadTransform, RequestSupplier, uuid_placeholder};
pub use types::{HttpRequest, HttpResponse};
pub use unit::{DEFAULT_REQUEST_TIMEOUT, HttpWorkUnit};
