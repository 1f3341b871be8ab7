use std::sync::Arc;
use std::time::{Duration, Instant};

use pokes_core::{Reporter, SharedWorkUnit, WorkFuture, WorkUnit};

use super::{HttpClient, RequestSupplier};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Inner {
    client: HttpClient,
    supplier: RequestSupplier,
    timeout: Duration,
}

/// Work unit sending one HTTP request per invocation.
///
/// Any response counts as an outcome under its status code (`"204"`, `"500"`); transport
/// problems are reported as failures under a [`crate::FailureReason`].
#[derive(Debug, Clone)]
pub struct HttpWorkUnit {
    inner: Arc<Inner>,
}

impl HttpWorkUnit {
    pub fn new(client: HttpClient, supplier: RequestSupplier) -> Self {
        Self::with_timeout(client, supplier, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(client: HttpClient, supplier: RequestSupplier, timeout: Duration) -> Self {
        tracing::info!(
            method = %supplier.method(),
            url = supplier.url(),
            timeout_ms = timeout.as_millis() as u64,
            "http work unit initialized"
        );
        Self {
            inner: Arc::new(Inner {
                client,
                supplier,
                timeout,
            }),
        }
    }

    pub fn shared(self) -> SharedWorkUnit {
        Arc::new(self)
    }

    async fn execute(inner: Arc<Inner>, reporter: Reporter) {
        let started = Instant::now();
        let req = inner.supplier.request(Some(inner.timeout));

        match inner.client.request(req).await {
            Ok(res) => reporter.report_success(res.status.to_string(), started.elapsed()),
            Err(err) => {
                let reason = err.failure_reason();
                tracing::trace!(%reason, error = %err, "http call failed");
                reporter.report_failure(reason.to_string(), err.to_string(), started.elapsed());
            }
        }
    }
}

impl WorkUnit for HttpWorkUnit {
    fn call(&self, reporter: Reporter) -> WorkFuture {
        Box::pin(Self::execute(self.inner.clone(), reporter))
    }
}
