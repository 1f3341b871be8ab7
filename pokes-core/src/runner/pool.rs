use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_channel::Receiver;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::config::clamp_pool_size;
use crate::stats::StatsCollector;
use crate::work::SharedWorkUnit;

/// Queued unit of work. The pool only invokes it; outcomes flow through the reporter.
pub type Task = SharedWorkUnit;

/// Number of pool workers that have not exited yet.
#[derive(Debug, Clone, Default)]
pub struct LiveWorkers(Arc<AtomicUsize>);

impl LiveWorkers {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

struct LiveGuard(LiveWorkers);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Fixed-size set of workers draining one bounded task queue.
///
/// Workers stop on cancellation (immediately, leaving queued tasks behind) or once the queue is
/// closed and empty. A task that already started always runs to completion, and a task that
/// panics is counted while its worker keeps draining the queue.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    live: LiveWorkers,
    finished: oneshot::Receiver<()>,
}

impl WorkerPool {
    /// Spawns the workers. Sizes above [`super::MAX_POOL_SIZE`] are clamped.
    pub fn start(
        requested: usize,
        tasks: Receiver<Task>,
        stats: Arc<StatsCollector>,
        cancel: CancellationToken,
    ) -> Self {
        let size = clamp_pool_size(requested);
        if size != requested {
            tracing::debug!(requested, size, "worker pool size clamped");
        }

        let live = LiveWorkers(Arc::new(AtomicUsize::new(size)));

        let mut workers = JoinSet::new();
        for worker in 0..size {
            let guard = LiveGuard(live.clone());
            workers.spawn(worker_loop(
                worker,
                tasks.clone(),
                stats.clone(),
                cancel.clone(),
                guard,
            ));
        }

        let (finished_tx, finished) = oneshot::channel();
        tokio::spawn(async move {
            while let Some(res) = workers.join_next().await {
                if let Err(err) = res {
                    tracing::error!(error = %err, "pool worker failed");
                }
            }
            let _ = finished_tx.send(());
        });

        Self {
            size,
            live,
            finished,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn live_workers(&self) -> LiveWorkers {
        self.live.clone()
    }

    /// Resolves once every worker has exited.
    pub async fn wait(self) {
        // The supervisor only drops the sender after signalling, or if the runtime shuts down.
        let _ = self.finished.await;
    }
}

async fn worker_loop(
    worker: usize,
    tasks: Receiver<Task>,
    stats: Arc<StatsCollector>,
    cancel: CancellationToken,
    _live: LiveGuard,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            task = tasks.recv() => match task {
                Ok(task) => task,
                Err(_) => break,
            },
        };

        // A panicking unit must not take the worker down with it. Its reporter is dropped
        // during unwinding and records the invocation as unreported.
        if let Err(err) = tokio::spawn(task.call(stats.reporter())).await {
            tracing::warn!(worker, error = %err, "work unit panicked");
        }
    }

    tracing::trace!(worker, "pool worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::MAX_POOL_SIZE;
    use crate::stats::Reporter;
    use std::time::Duration;

    fn ok_unit() -> Task {
        Arc::new(|reporter: Reporter| async move {
            reporter.report_success("ok", Duration::from_millis(1));
        })
    }

    #[tokio::test]
    async fn closed_queue_is_drained_before_exit() {
        let (tx, rx) = async_channel::bounded(64);
        for _ in 0..20 {
            tx.send(ok_unit()).await.unwrap_or_else(|e| panic!("send: {e}"));
        }
        tx.close();

        let stats = Arc::new(StatsCollector::default());
        let pool = WorkerPool::start(3, rx, stats.clone(), CancellationToken::new());
        let live = pool.live_workers();
        pool.wait().await;

        assert_eq!(stats.total_executed(), 20);
        assert_eq!(live.get(), 0);
    }

    #[tokio::test]
    async fn cancellation_leaves_queued_tasks_unexecuted() {
        let (tx, rx) = async_channel::bounded(64);
        for _ in 0..10 {
            tx.send(ok_unit()).await.unwrap_or_else(|e| panic!("send: {e}"));
        }

        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = Arc::new(StatsCollector::default());
        let pool = WorkerPool::start(4, rx, stats.clone(), cancel);
        pool.wait().await;

        assert_eq!(stats.total_executed(), 0);
        assert_eq!(tx.len(), 10);
    }

    #[tokio::test]
    async fn in_flight_task_finishes_after_cancel() {
        let (tx, rx) = async_channel::bounded(4);
        let slow: Task = Arc::new(|reporter: Reporter| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            reporter.report_success("slow", Duration::from_millis(100));
        });
        tx.send(slow).await.unwrap_or_else(|e| panic!("send: {e}"));

        let cancel = CancellationToken::new();
        let stats = Arc::new(StatsCollector::default());
        let pool = WorkerPool::start(1, rx, stats.clone(), cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        pool.wait().await;

        assert_eq!(stats.snapshot().bucket("slow").map(|b| b.count), Some(1));
    }

    #[tokio::test]
    async fn panicking_task_does_not_kill_its_worker() {
        use std::sync::atomic::AtomicBool;

        let (tx, rx) = async_channel::bounded(16);
        let exploded = Arc::new(AtomicBool::new(false));
        let first_call_panics: Task = Arc::new(move |reporter: Reporter| {
            let first = !exploded.swap(true, Ordering::SeqCst);
            async move {
                if first {
                    panic!("unit blew up");
                }
                reporter.report_success("ok", Duration::from_millis(1));
            }
        });
        for _ in 0..6 {
            tx.send(first_call_panics.clone())
                .await
                .unwrap_or_else(|e| panic!("send: {e}"));
        }
        tx.close();

        let stats = Arc::new(StatsCollector::default());
        let pool = WorkerPool::start(1, rx, stats.clone(), CancellationToken::new());
        pool.wait().await;

        let snap = stats.snapshot();
        assert_eq!(snap.total_executed, 6);
        assert_eq!(snap.bucket("ok").map(|b| b.count), Some(5));
        assert_eq!(
            snap.bucket(crate::stats::UNREPORTED_REASON).map(|b| b.count),
            Some(1)
        );
    }

    #[tokio::test]
    async fn oversized_pool_is_clamped() {
        let (tx, rx) = async_channel::bounded::<Task>(1);
        tx.close();

        let stats = Arc::new(StatsCollector::default());
        let pool = WorkerPool::start(
            MAX_POOL_SIZE + 500,
            rx,
            stats,
            CancellationToken::new(),
        );
        assert_eq!(pool.size(), MAX_POOL_SIZE);
        pool.wait().await;
    }
}
