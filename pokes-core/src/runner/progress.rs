use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::stage::{StagePolicy, StageState, StageSummary};
use crate::format::pretty_duration;
use crate::stats::StatsSnapshot;

/// Point-in-time view of one stage, used for live progress rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub policy: StagePolicy,
    pub state: StageState,
    pub elapsed: Duration,
    /// Time left for rate stages; `None` for volume stages.
    pub remaining: Option<Duration>,
    /// 0..=100. Stays below 100 until the stage is done.
    pub percent: f64,
    pub live_workers: usize,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    StageStarted(StageProgress),
    Tick { tick: u64, progress: StageProgress },
    StageFinished(StageSummary),
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

pub(crate) fn progress_percent(policy: &StagePolicy, elapsed: Duration, executed: u64) -> f64 {
    let ratio = match *policy {
        StagePolicy::Rate { duration, .. } => elapsed.as_secs_f64() / duration.as_secs_f64(),
        StagePolicy::Volume { amount, .. } => executed as f64 / amount as f64,
    };
    let percent = ratio * 100.0;
    if percent >= 100.0 { 99.0 } else { percent }
}

impl fmt::Display for StageProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            StageState::Init => writeln!(f, "Stage [{}], {}", self.stage, self.policy),
            StageState::Done => writeln!(
                f,
                "Stage [{}] done, {}, ran for: [{}]",
                self.stage,
                self.policy,
                pretty_duration(self.elapsed)
            ),
            StageState::Running => {
                write!(
                    f,
                    "Stage [{}] running, {}, progress: [{:.1}%], running for: [{}]",
                    self.stage,
                    self.policy,
                    self.percent,
                    pretty_duration(self.elapsed)
                )?;
                if let Some(remaining) = self.remaining {
                    write!(f, ", time left: [{}]", pretty_duration(remaining))?;
                }
                writeln!(f)?;
                write!(f, "{}", self.stats)?;
                writeln!(f, "Workers: {}", self.live_workers)
            }
        }
    }
}
