use std::sync::Arc;
use std::time::Duration;

use async_channel::{Sender, TrySendError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::pool::Task;
use crate::stats::StatsCollector;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacerOutcome {
    pub submitted: u64,
    pub dropped: u64,
}

/// Submission interval for `rate` tasks per second, in whole microseconds.
pub fn rate_interval(rate: u64) -> Duration {
    Duration::from_micros(1_000_000 / rate.max(1))
}

/// Submits `task` once per `interval` until `deadline` or cancellation.
///
/// The first submission happens immediately. Submissions that find the queue full are shed and
/// counted as dropped; the pacer never blocks on the queue.
pub(crate) async fn pace_rate(
    tasks: Sender<Task>,
    task: Task,
    interval: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
    stats: &Arc<StatsCollector>,
) -> PacerOutcome {
    let mut outcome = PacerOutcome::default();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = &mut deadline => break,
            _ = ticker.tick() => {}
        }

        match tasks.try_send(task.clone()) {
            Ok(()) => outcome.submitted += 1,
            Err(TrySendError::Full(_)) => {
                outcome.dropped += 1;
                stats.record_dropped(1);
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }

    if outcome.dropped > 0 {
        tracing::warn!(
            dropped = outcome.dropped,
            "task queue was full; submissions dropped"
        );
    }

    outcome
}

/// Submits `task` exactly `amount` times, waiting for queue space, then closes the queue so
/// workers drain what is left and exit.
pub(crate) async fn submit_volume(
    tasks: Sender<Task>,
    task: Task,
    amount: u64,
    cancel: &CancellationToken,
) -> PacerOutcome {
    let mut outcome = PacerOutcome::default();

    while outcome.submitted < amount {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tasks.send(task.clone()) => sent,
        };
        if sent.is_err() {
            break;
        }
        outcome.submitted += 1;
    }

    tasks.close();
    outcome
}
