use std::time::Duration;

use super::error::{Error, Result};

/// Upper bound for the number of workers a single stage may spawn.
pub const MAX_POOL_SIZE: usize = 10_000;

/// Capacity of the per-stage task queue. Identical for every stage.
pub const TASK_QUEUE_CAPACITY: usize = 100_000;

/// Highest accepted rate. Above it the submission interval rounds to zero microseconds.
pub const MAX_RATE: u64 = 1_000_000;

pub const MIN_STAGE_DURATION: Duration = Duration::from_secs(1);
pub const MAX_STAGE_DURATION: Duration = Duration::from_secs(60 * 60);

pub const MAX_VOLUME_AMOUNT: u64 = 1_000_000_000;

/// Process-wide engine defaults shared by every stage of a load test.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Rate stages spawn `rate * headroom_factor` workers (clamped to [`MAX_POOL_SIZE`]).
    ///
    /// The queue starts to grow once target latency exceeds `headroom_factor` seconds.
    pub headroom_factor: u32,
    /// Tick of the live progress loop.
    pub report_interval: Duration,
    /// Ranks rendered in the final stage summary.
    pub percentiles: Vec<f64>,
    /// Diagnostic failure messages retained per reason bucket.
    pub max_failure_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headroom_factor: 5,
            report_interval: Duration::from_secs(1),
            percentiles: vec![50.0, 90.0, 99.0],
            max_failure_messages: 100,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.headroom_factor == 0 {
            return Err(Error::InvalidHeadroom);
        }
        if self.report_interval.is_zero() {
            return Err(Error::InvalidReportInterval);
        }
        if let Some(&p) = self
            .percentiles
            .iter()
            .find(|&&p| p.is_nan() || p <= 0.0 || p > 100.0)
        {
            return Err(Error::InvalidPercentileRank(p));
        }
        Ok(())
    }

    /// Worker count for a rate stage, clamped to [`MAX_POOL_SIZE`].
    pub fn rate_pool_size(&self, rate: u64) -> usize {
        let wanted = rate.saturating_mul(u64::from(self.headroom_factor.max(1)));
        clamp_pool_size(usize::try_from(wanted).unwrap_or(usize::MAX))
    }
}

pub fn clamp_pool_size(size: usize) -> usize {
    size.clamp(1, MAX_POOL_SIZE)
}
