mod config;
mod error;
mod pacer;
mod pool;
mod progress;
mod stage;

pub use config::{
    EngineConfig, MAX_POOL_SIZE, MAX_RATE, MAX_STAGE_DURATION, MAX_VOLUME_AMOUNT,
    MIN_STAGE_DURATION, TASK_QUEUE_CAPACITY, clamp_pool_size,
};
pub use error::{Error, Result};
pub use load_test::{LoadTest, LoadTestSummary};
pub use pacer::{PacerOutcome, rate_interval};
pub use pool::{LiveWorkers, Task, WorkerPool};
pub use progress::{ProgressFn, ProgressUpdate, StageProgress};
pub use stage::{Stage, StagePolicy, StageState, StageSummary};
