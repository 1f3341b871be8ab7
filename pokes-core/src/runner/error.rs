use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no stages to run (add at least one rate or volume stage)")]
    NoStages,

    #[error("`rate` must be within 1..={max} (got {rate})")]
    InvalidRate { rate: u64, max: u64 },

    #[error("`duration` must be within 1s..=60m (got {0:?})")]
    InvalidDuration(Duration),

    #[error("`amount` must be within 1..=1000000000 (got {0})")]
    InvalidAmount(u64),

    #[error("`concurrency` must be within 1..={max} (got {concurrency})")]
    InvalidConcurrency { concurrency: usize, max: usize },

    #[error("`headroom_factor` must be a positive integer")]
    InvalidHeadroom,

    #[error("`report_interval` must be a positive duration")]
    InvalidReportInterval,

    #[error("percentile rank `{0}` is outside (0, 100]")]
    InvalidPercentileRank(f64),

    #[error("stage {0} has already been run")]
    StageAlreadyRun(usize),
}
