mod format;
mod work;

pub mod runner;
pub mod stats;

pub use format::{format_latency, format_rank, pretty_duration};
pub use runner::{
    EngineConfig, Error, LoadTest, LoadTestSummary, ProgressFn, ProgressUpdate, Result, Stage,
    StagePolicy, StageProgress, StageState, StageSummary,
};
pub use stats::{PercentileError, Reporter, StatsCollector, StatsSnapshot, StatsSummary};
pub use work::{SharedWorkUnit, WorkFuture, WorkUnit};
