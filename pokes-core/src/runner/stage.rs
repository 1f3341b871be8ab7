use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::config::{
    EngineConfig, MAX_POOL_SIZE, MAX_RATE, MAX_STAGE_DURATION, MAX_VOLUME_AMOUNT,
    MIN_STAGE_DURATION, TASK_QUEUE_CAPACITY, clamp_pool_size,
};
use super::error::{Error, Result};
use super::pacer::{PacerOutcome, pace_rate, rate_interval, submit_volume};
use super::pool::{LiveWorkers, Task, WorkerPool};
use super::progress::{ProgressFn, ProgressUpdate, StageProgress, progress_percent};
use crate::format::pretty_duration;
use crate::stats::{StatsCollector, StatsSnapshot, StatsSummary};
use crate::work::SharedWorkUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StageState {
    Init,
    Running,
    Done,
}

/// How a stage drives its work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Submit `rate` tasks per second for `duration`, regardless of completion.
    Rate { rate: u64, duration: Duration },
    /// Run exactly `amount` tasks with `concurrency` workers.
    Volume { amount: u64, concurrency: usize },
}

impl StagePolicy {
    pub fn rate(rate: u64, duration: Duration) -> Result<Self> {
        let policy = Self::Rate { rate, duration };
        policy.validate()?;
        Ok(policy)
    }

    pub fn volume(amount: u64, concurrency: usize) -> Result<Self> {
        let policy = Self::Volume {
            amount,
            concurrency,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Rate { rate, duration } => {
                if !(1..=MAX_RATE).contains(&rate) {
                    return Err(Error::InvalidRate {
                        rate,
                        max: MAX_RATE,
                    });
                }
                if !(MIN_STAGE_DURATION..=MAX_STAGE_DURATION).contains(&duration) {
                    return Err(Error::InvalidDuration(duration));
                }
            }
            Self::Volume {
                amount,
                concurrency,
            } => {
                if !(1..=MAX_VOLUME_AMOUNT).contains(&amount) {
                    return Err(Error::InvalidAmount(amount));
                }
                if !(1..=MAX_POOL_SIZE).contains(&concurrency) {
                    return Err(Error::InvalidConcurrency {
                        concurrency,
                        max: MAX_POOL_SIZE,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for StagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Rate { rate, duration } => write!(
                f,
                "rate: [{rate}/s], duration: [{}]",
                pretty_duration(duration)
            ),
            Self::Volume {
                amount,
                concurrency,
            } => write!(f, "amount: [{amount}], concurrency: [{concurrency}]"),
        }
    }
}

/// Final report of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub stage: usize,
    pub policy: StagePolicy,
    pub state: StageState,
    /// Set when the stage ended because the load test was cancelled.
    pub cancelled: bool,
    pub elapsed: Duration,
    pub pool_size: usize,
    pub submitted: u64,
    pub stats: StatsSummary,
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            StageState::Init => writeln!(f, "Stage [{}] not run, {}", self.stage, self.policy),
            StageState::Running | StageState::Done => {
                let label = if self.cancelled { "cancelled" } else { "done" };
                writeln!(
                    f,
                    "Stage [{}] {label}, {}, ran for: [{}], workers: [{}], submitted: [{}]",
                    self.stage,
                    self.policy,
                    pretty_duration(self.elapsed),
                    self.pool_size,
                    self.submitted
                )?;
                write!(f, "{}", self.stats)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Tracker {
    stage: usize,
    policy: StagePolicy,
    started: Instant,
    stats: Arc<StatsCollector>,
    live: LiveWorkers,
}

impl Tracker {
    fn running(&self) -> StageProgress {
        let elapsed = self.started.elapsed();
        let stats = self.stats.snapshot();
        let remaining = match self.policy {
            StagePolicy::Rate { duration, .. } => Some(duration.saturating_sub(elapsed)),
            StagePolicy::Volume { .. } => None,
        };
        StageProgress {
            stage: self.stage,
            policy: self.policy,
            state: StageState::Running,
            elapsed,
            remaining,
            percent: progress_percent(&self.policy, elapsed, stats.total_executed),
            live_workers: self.live.get(),
            stats,
        }
    }
}

/// One phase of a load test: a work unit, a policy, and the stats it produced.
///
/// A stage moves `Init -> Running -> Done` exactly once.
pub struct Stage {
    id: usize,
    policy: StagePolicy,
    unit: SharedWorkUnit,
    state: StageState,
    stats: Arc<StatsCollector>,
    tracker: Option<Tracker>,
    summary: Option<StageSummary>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub fn new(id: usize, policy: StagePolicy, unit: SharedWorkUnit) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            id,
            policy,
            unit,
            state: StageState::Init,
            stats: Arc::new(StatsCollector::default()),
            tracker: None,
            summary: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn policy(&self) -> StagePolicy {
        self.policy
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn progress(&self) -> StageProgress {
        match (self.state, &self.tracker, &self.summary) {
            (StageState::Running, Some(tracker), _) => tracker.running(),
            (StageState::Done, _, Some(summary)) => StageProgress {
                stage: self.id,
                policy: self.policy,
                state: StageState::Done,
                elapsed: summary.elapsed,
                remaining: None,
                percent: 100.0,
                live_workers: 0,
                stats: self.stats.snapshot(),
            },
            _ => StageProgress {
                stage: self.id,
                policy: self.policy,
                state: self.state,
                elapsed: Duration::ZERO,
                remaining: None,
                percent: 0.0,
                live_workers: 0,
                stats: StatsSnapshot::default(),
            },
        }
    }

    /// Summary of a finished stage, or a "not run" summary for a stage still in `Init`.
    pub fn summary(&self) -> StageSummary {
        self.summary.clone().unwrap_or_else(|| StageSummary {
            stage: self.id,
            policy: self.policy,
            state: self.state,
            cancelled: false,
            elapsed: Duration::ZERO,
            pool_size: 0,
            submitted: 0,
            stats: StatsSummary::default(),
        })
    }

    /// Runs the stage to completion. Cancelling `cancel` ends it early; tasks already executing
    /// still finish and are counted.
    pub async fn run(
        &mut self,
        config: &EngineConfig,
        cancel: &CancellationToken,
        progress: Option<&ProgressFn>,
    ) -> Result<StageSummary> {
        if self.state != StageState::Init {
            return Err(Error::StageAlreadyRun(self.id));
        }

        let stage_cancel = cancel.child_token();
        self.stats = Arc::new(StatsCollector::new(config.max_failure_messages));

        let pool_size = match self.policy {
            StagePolicy::Rate { rate, .. } => config.rate_pool_size(rate),
            StagePolicy::Volume { concurrency, .. } => clamp_pool_size(concurrency),
        };

        let (tasks_tx, tasks_rx) = async_channel::bounded::<Task>(TASK_QUEUE_CAPACITY);
        let pool = WorkerPool::start(
            pool_size,
            tasks_rx,
            self.stats.clone(),
            stage_cancel.clone(),
        );
        let pool_size = pool.size();

        let started = Instant::now();
        let tracker = Tracker {
            stage: self.id,
            policy: self.policy,
            started,
            stats: self.stats.clone(),
            live: pool.live_workers(),
        };
        self.tracker = Some(tracker.clone());
        self.state = StageState::Running;

        tracing::info!(stage = self.id, policy = %self.policy, workers = pool_size, "stage started");
        if let Some(progress) = progress {
            progress(ProgressUpdate::StageStarted(tracker.running()));
        }

        let stop_reporting = CancellationToken::new();
        let reporting = progress.cloned().map(|progress| {
            tokio::spawn(report_progress(
                tracker,
                config.report_interval,
                stop_reporting.clone(),
                progress,
            ))
        });

        let outcome = match self.policy {
            StagePolicy::Rate { rate, duration } => {
                let deadline = tokio::time::Instant::from_std(started + duration);
                let outcome = pace_rate(
                    tasks_tx,
                    self.unit.clone(),
                    rate_interval(rate),
                    deadline,
                    &stage_cancel,
                    &self.stats,
                )
                .await;
                stage_cancel.cancel();
                outcome
            }
            StagePolicy::Volume { amount, .. } => {
                let outcome =
                    submit_volume(tasks_tx, self.unit.clone(), amount, &stage_cancel).await;
                if outcome.submitted < amount {
                    stage_cancel.cancel();
                }
                outcome
            }
        };

        pool.wait().await;
        stop_reporting.cancel();
        if let Some(reporting) = reporting
            && let Err(err) = reporting.await
        {
            tracing::error!(stage = self.id, error = %err, "progress reporting failed");
        }

        let summary = self.finish(config, started.elapsed(), pool_size, outcome, cancel);
        if let Some(progress) = progress {
            progress(ProgressUpdate::StageFinished(summary.clone()));
        }
        Ok(summary)
    }

    fn finish(
        &mut self,
        config: &EngineConfig,
        elapsed: Duration,
        pool_size: usize,
        outcome: PacerOutcome,
        cancel: &CancellationToken,
    ) -> StageSummary {
        let stats = self.stats.summarize(&config.percentiles);
        let summary = StageSummary {
            stage: self.id,
            policy: self.policy,
            state: StageState::Done,
            cancelled: cancel.is_cancelled(),
            elapsed,
            pool_size,
            submitted: outcome.submitted,
            stats,
        };

        tracing::info!(
            stage = self.id,
            executed = summary.stats.total_executed,
            dropped = outcome.dropped,
            cancelled = summary.cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );

        self.state = StageState::Done;
        self.tracker = None;
        self.summary = Some(summary.clone());
        summary
    }
}

async fn report_progress(
    tracker: Tracker,
    every: Duration,
    stop: CancellationToken,
    progress: ProgressFn,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut tick = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tick += 1;
        progress(ProgressUpdate::Tick {
            tick,
            progress: tracker.running(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Reporter;

    fn noop() -> SharedWorkUnit {
        Arc::new(|reporter: Reporter| async move {
            reporter.report_success("ok", Duration::ZERO);
        })
    }

    #[test]
    fn policy_validation_bounds() {
        assert!(StagePolicy::rate(1, Duration::from_secs(1)).is_ok());
        assert!(StagePolicy::rate(MAX_RATE, Duration::from_secs(3600)).is_ok());
        assert!(matches!(
            StagePolicy::rate(0, Duration::from_secs(1)),
            Err(Error::InvalidRate { .. })
        ));
        assert!(matches!(
            StagePolicy::rate(MAX_RATE + 1, Duration::from_secs(1)),
            Err(Error::InvalidRate { .. })
        ));
        assert!(matches!(
            StagePolicy::rate(10, Duration::from_millis(999)),
            Err(Error::InvalidDuration(_))
        ));
        assert!(matches!(
            StagePolicy::rate(10, Duration::from_secs(3601)),
            Err(Error::InvalidDuration(_))
        ));

        assert!(StagePolicy::volume(1, 1).is_ok());
        assert!(matches!(
            StagePolicy::volume(0, 1),
            Err(Error::InvalidAmount(0))
        ));
        assert!(matches!(
            StagePolicy::volume(MAX_VOLUME_AMOUNT + 1, 1),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            StagePolicy::volume(10, 0),
            Err(Error::InvalidConcurrency { .. })
        ));
        assert!(matches!(
            StagePolicy::volume(10, MAX_POOL_SIZE + 1),
            Err(Error::InvalidConcurrency { .. })
        ));
    }

    #[test]
    fn policy_renders_its_parameters() {
        let rate = StagePolicy::Rate {
            rate: 15,
            duration: Duration::from_secs(600),
        };
        assert_eq!(rate.to_string(), "rate: [15/s], duration: [10m]");

        let volume = StagePolicy::Volume {
            amount: 50,
            concurrency: 5,
        };
        assert_eq!(volume.to_string(), "amount: [50], concurrency: [5]");
    }

    #[test]
    fn unstarted_stage_reports_not_run() {
        let stage = match Stage::new(3, StagePolicy::Volume { amount: 5, concurrency: 1 }, noop())
        {
            Ok(stage) => stage,
            Err(err) => panic!("stage: {err}"),
        };
        assert_eq!(stage.state(), StageState::Init);
        assert_eq!(stage.progress().percent, 0.0);

        let summary = stage.summary();
        assert_eq!(summary.state, StageState::Init);
        assert!(summary.to_string().starts_with("Stage [3] not run"));
    }

    #[tokio::test]
    async fn volume_stage_runs_once() {
        let mut stage = match Stage::new(1, StagePolicy::Volume { amount: 10, concurrency: 2 }, noop())
        {
            Ok(stage) => stage,
            Err(err) => panic!("stage: {err}"),
        };
        let cfg = EngineConfig::default();
        let cancel = CancellationToken::new();

        let summary = match stage.run(&cfg, &cancel, None).await {
            Ok(summary) => summary,
            Err(err) => panic!("run: {err}"),
        };
        assert_eq!(summary.state, StageState::Done);
        assert_eq!(summary.stats.total_executed, 10);
        assert_eq!(stage.progress().percent, 100.0);

        assert!(matches!(
            stage.run(&cfg, &cancel, None).await,
            Err(Error::StageAlreadyRun(1))
        ));
    }
}
