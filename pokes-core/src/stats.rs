mod percentile;
mod reporter;
mod summary;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub use percentile::{PercentileError, percentiles};
pub use reporter::{Reporter, UNREPORTED_REASON};
pub use summary::{BucketSnapshot, BucketSummary, StatsSnapshot, StatsSummary};

/// Outcomes recorded for a single reason.
#[derive(Debug, Clone, Default)]
struct Bucket {
    count: u64,
    /// Elapsed time of every outcome, in milliseconds.
    elapsed_ms: Vec<f64>,
    elapsed_sum_ms: f64,
    messages: Vec<String>,
    messages_discarded: u64,
}

impl Bucket {
    fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_nanos() as f64 / 1e6;
        self.count = self.count.saturating_add(1);
        self.elapsed_ms.push(ms);
        self.elapsed_sum_ms += ms;
    }

    fn avg(&self) -> Duration {
        if self.elapsed_ms.is_empty() {
            return Duration::ZERO;
        }
        ms_to_duration(self.elapsed_sum_ms / self.elapsed_ms.len() as f64)
    }
}

#[derive(Debug, Default)]
struct Inner {
    total_executed: u64,
    dropped: u64,
    buckets: BTreeMap<String, Bucket>,
}

/// Per-stage outcome aggregator. Every mutation goes through one lock.
#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<Inner>,
    max_failure_messages: usize,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new(100)
    }
}

impl StatsCollector {
    pub fn new(max_failure_messages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_failure_messages,
        }
    }

    /// A fresh outcome handle for one work-unit invocation.
    pub fn reporter(self: &Arc<Self>) -> Reporter {
        Reporter::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_success(&self, reason: &str, elapsed: Duration) {
        let mut inner = self.lock();
        inner.total_executed = inner.total_executed.saturating_add(1);
        bucket_mut(&mut inner.buckets, reason).record(elapsed);
    }

    pub fn record_failure(&self, reason: &str, message: &str, elapsed: Duration) {
        let mut inner = self.lock();
        inner.total_executed = inner.total_executed.saturating_add(1);

        let bucket = bucket_mut(&mut inner.buckets, reason);
        bucket.record(elapsed);
        if bucket.messages.len() < self.max_failure_messages {
            bucket.messages.push(message.to_string());
        } else {
            bucket.messages_discarded = bucket.messages_discarded.saturating_add(1);
        }
    }

    /// Submissions shed because the task queue was full. Not counted as executed.
    pub fn record_dropped(&self, n: u64) {
        if n == 0 {
            return;
        }
        let mut inner = self.lock();
        inner.dropped = inner.dropped.saturating_add(n);
    }

    pub fn total_executed(&self) -> u64 {
        self.lock().total_executed
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Counts and averages only; cheap enough for every progress tick.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.lock();
        StatsSnapshot {
            total_executed: inner.total_executed,
            dropped: inner.dropped,
            buckets: inner
                .buckets
                .iter()
                .map(|(reason, b)| BucketSnapshot {
                    reason: reason.clone(),
                    count: b.count,
                    avg: b.avg(),
                })
                .collect(),
        }
    }

    /// Full summary including percentiles at `ranks`.
    ///
    /// Samples are copied out under the lock and sorted afterwards, so reporting workers are never
    /// blocked behind the sort.
    pub fn summarize(&self, ranks: &[f64]) -> StatsSummary {
        let (total_executed, dropped, frozen) = {
            let inner = self.lock();
            (
                inner.total_executed,
                inner.dropped,
                inner.buckets.clone(),
            )
        };

        let buckets = frozen
            .into_iter()
            .map(|(reason, b)| {
                let percentiles = percentiles(&b.elapsed_ms, ranks).map(|values| {
                    ranks
                        .iter()
                        .zip(values)
                        .map(|(&rank, ms)| (rank, ms_to_duration(ms)))
                        .collect()
                });

                BucketSummary {
                    avg: b.avg(),
                    reason,
                    count: b.count,
                    percentiles,
                    messages: b.messages,
                    messages_discarded: b.messages_discarded,
                }
            })
            .collect();

        StatsSummary {
            total_executed,
            dropped,
            buckets,
        }
    }
}

fn bucket_mut<'a>(buckets: &'a mut BTreeMap<String, Bucket>, reason: &str) -> &'a mut Bucket {
    buckets.entry(reason.to_string()).or_default()
}

fn ms_to_duration(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((ms * 1e6).round() as u64)
}
