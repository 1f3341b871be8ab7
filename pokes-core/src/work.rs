use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::stats::Reporter;

pub type WorkFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// One pluggable unit of load, invoked once per submission.
///
/// Every invocation gets its own [`Reporter`] and must report exactly one outcome through it.
/// Transport concerns (connections, timeouts, payloads) belong to the implementation; the engine
/// never retries and never interrupts an invocation once it has started.
///
/// Any `Fn(Reporter) -> impl Future<Output = ()>` closure is a work unit.
pub trait WorkUnit: Send + Sync + 'static {
    fn call(&self, reporter: Reporter) -> WorkFuture;
}

impl<F, Fut> WorkUnit for F
where
    F: Fn(Reporter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, reporter: Reporter) -> WorkFuture {
        Box::pin(self(reporter))
    }
}

pub type SharedWorkUnit = Arc<dyn WorkUnit>;
