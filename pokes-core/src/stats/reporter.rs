use std::sync::Arc;
use std::time::{Duration, Instant};

use super::StatsCollector;

/// Reason recorded when a work unit returns without reporting an outcome.
pub const UNREPORTED_REASON: &str = "unreported";

/// Outcome handle handed to one work-unit invocation.
///
/// Reporting consumes the handle, so a unit can report at most once. A handle dropped without a
/// report (early return, panic, cancelled future) records a failure under [`UNREPORTED_REASON`]
/// so that every invocation is counted exactly once.
#[derive(Debug)]
#[must_use = "a work unit must report exactly one outcome"]
pub struct Reporter {
    stats: Arc<StatsCollector>,
    created: Instant,
    reported: bool,
}

impl Reporter {
    pub(crate) fn new(stats: Arc<StatsCollector>) -> Self {
        Self {
            stats,
            created: Instant::now(),
            reported: false,
        }
    }

    pub fn report_success(mut self, reason: impl AsRef<str>, elapsed: Duration) {
        self.reported = true;
        self.stats.record_success(reason.as_ref(), elapsed);
    }

    pub fn report_failure(
        mut self,
        reason: impl AsRef<str>,
        message: impl AsRef<str>,
        elapsed: Duration,
    ) {
        self.reported = true;
        self.stats
            .record_failure(reason.as_ref(), message.as_ref(), elapsed);
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        tracing::debug!("work unit finished without reporting an outcome");
        self.stats.record_failure(
            UNREPORTED_REASON,
            "work unit finished without reporting an outcome",
            self.created.elapsed(),
        );
    }
}
