use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pokes_core::runner::{LoadTest, MAX_POOL_SIZE};
use pokes_core::stats::UNREPORTED_REASON;
use pokes_core::{
    EngineConfig, Error, ProgressUpdate, Reporter, SharedWorkUnit, StageState,
};

fn sleeping_unit(delay: Duration) -> SharedWorkUnit {
    reason_unit("ok", delay)
}

fn reason_unit(reason: &'static str, delay: Duration) -> SharedWorkUnit {
    Arc::new(move |reporter: Reporter| async move {
        tokio::time::sleep(delay).await;
        reporter.report_success(reason, delay);
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_stage_submits_at_requested_rate() -> anyhow::Result<()> {
    let mut lt = LoadTest::new();
    lt.add_rate_stage(15, Duration::from_secs(1), sleeping_unit(Duration::ZERO))?;

    let summary = lt.start().await?;
    let stage = &summary.stages[0];

    assert_eq!(stage.state, StageState::Done);
    assert_eq!(stage.pool_size, 75);
    let executed = stage.stats.total_executed;
    assert!((13..=17).contains(&executed), "executed {executed}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_stage_with_latency_keeps_rate_and_latency() -> anyhow::Result<()> {
    let mut lt = LoadTest::new();
    lt.add_rate_stage(10, Duration::from_secs(2), reason_unit("200", Duration::from_millis(5)))?;

    let summary = lt.start().await?;
    let stats = &summary.stages[0].stats;

    assert!(
        (18..=22).contains(&stats.total_executed),
        "executed {}",
        stats.total_executed
    );
    assert_eq!(stats.buckets.len(), 1);

    let ok = stats
        .bucket("200")
        .ok_or_else(|| anyhow::anyhow!("missing 200 bucket"))?;
    assert_eq!(ok.count, stats.total_executed);
    assert_eq!(ok.avg, Duration::from_millis(5));

    let percentiles = ok
        .percentiles
        .as_ref()
        .map_err(|err| anyhow::anyhow!("percentiles: {err}"))?;
    let ranks: Vec<f64> = percentiles.iter().map(|(rank, _)| *rank).collect();
    assert_eq!(ranks, vec![50.0, 90.0, 99.0]);
    for (rank, value) in percentiles {
        assert_eq!(*value, Duration::from_millis(5), "p{rank}");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_rate_pool_is_clamped_and_stage_completes() -> anyhow::Result<()> {
    let mut lt = LoadTest::new();
    // 2_001/s with the default headroom of 5 asks for 10_005 workers.
    lt.add_rate_stage(2_001, Duration::from_secs(1), sleeping_unit(Duration::ZERO))?;

    let summary = lt.start().await?;
    let stage = &summary.stages[0];

    assert_eq!(stage.pool_size, MAX_POOL_SIZE);
    assert_eq!(stage.state, StageState::Done);
    assert!(!stage.cancelled);
    assert!(stage.stats.total_executed > 0);
    assert!(stage.stats.total_executed <= stage.submitted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_units_do_not_lose_queued_work() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky: SharedWorkUnit = Arc::new(move |reporter: Reporter| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if call < 2 {
                panic!("work unit failed on call {call}");
            }
            reporter.report_success("ok", Duration::ZERO);
        }
    });

    let mut lt = LoadTest::new();
    lt.add_volume_stage(50, 2, flaky)?;
    let summary = lt.start().await?;
    let stage = &summary.stages[0];

    assert_eq!(stage.state, StageState::Done);
    assert_eq!(stage.submitted, 50);
    assert_eq!(stage.stats.total_executed, 50);
    assert_eq!(stage.stats.bucket(UNREPORTED_REASON).map(|b| b.count), Some(2));
    assert_eq!(stage.stats.bucket("ok").map(|b| b.count), Some(48));
    assert_eq!(calls.load(Ordering::SeqCst), 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn volume_stage_runs_exact_amount() -> anyhow::Result<()> {
    let mut lt = LoadTest::new();
    lt.add_volume_stage(50, 5, sleeping_unit(Duration::from_millis(2)))?;

    let summary = lt.start().await?;
    let stage = &summary.stages[0];

    assert_eq!(stage.submitted, 50);
    assert_eq!(stage.stats.total_executed, 50);
    assert_eq!(stage.pool_size, 5);
    assert!(!summary.cancelled);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stages_run_in_order() -> anyhow::Result<()> {
    let order = Arc::new(Mutex::new(Vec::new()));

    let unit_for = |tag: &'static str| -> SharedWorkUnit {
        let order = order.clone();
        Arc::new(move |reporter: Reporter| {
            let order = order.clone();
            async move {
                order
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(tag);
                reporter.report_success(tag, Duration::ZERO);
            }
        })
    };

    let mut lt = LoadTest::new();
    lt.add_volume_stage(5, 2, unit_for("first"))?;
    lt.add_volume_stage(5, 2, unit_for("second"))?;
    let summary = lt.start().await?;

    assert_eq!(summary.total_executed(), 10);
    let order = order
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    let first_second = order
        .iter()
        .position(|t| *t == "second")
        .ok_or_else(|| anyhow::anyhow!("second stage never ran"))?;
    assert!(order[..first_second].iter().all(|t| *t == "first"));
    assert_eq!(first_second, 5);
    Ok(())
}

#[tokio::test]
async fn start_without_stages_fails() {
    let res = LoadTest::new().start().await;
    assert!(matches!(res, Err(Error::NoStages)));
}

#[test]
fn invalid_stages_are_rejected_up_front() {
    let mut lt = LoadTest::new();
    let unit = sleeping_unit(Duration::ZERO);

    assert!(matches!(
        lt.add_rate_stage(0, Duration::from_secs(1), unit.clone()),
        Err(Error::InvalidRate { .. })
    ));
    assert!(matches!(
        lt.add_rate_stage(10, Duration::from_millis(10), unit.clone()),
        Err(Error::InvalidDuration(_))
    ));
    assert!(matches!(
        lt.add_volume_stage(0, 1, unit.clone()),
        Err(Error::InvalidAmount(0))
    ));
    assert!(matches!(
        lt.add_volume_stage(10, 0, unit),
        Err(Error::InvalidConcurrency { .. })
    ));
    assert!(lt.stages().is_empty());
}

#[test]
fn invalid_engine_config_is_rejected() {
    let cfg = EngineConfig {
        headroom_factor: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        LoadTest::with_config(cfg),
        Err(Error::InvalidHeadroom)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_current_stage_and_skips_the_rest() -> anyhow::Result<()> {
    let mut lt = LoadTest::new();
    lt.add_volume_stage(1_000, 2, sleeping_unit(Duration::from_millis(50)))?;
    lt.add_rate_stage(10, Duration::from_secs(5), sleeping_unit(Duration::ZERO))?;

    let cancel = lt.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(5), lt.start()).await??;

    assert!(summary.cancelled);
    let first = &summary.stages[0];
    assert_eq!(first.state, StageState::Done);
    assert!(first.cancelled);
    assert!(first.stats.total_executed < 1_000);
    assert!(first.stats.total_executed >= 2);

    let second = &summary.stages[1];
    assert_eq!(second.state, StageState::Init);
    assert_eq!(second.stats.total_executed, 0);
    assert!(summary.to_string().contains("Stage [2] not run"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_units_are_counted_as_unreported() -> anyhow::Result<()> {
    let silent: SharedWorkUnit = Arc::new(|reporter: Reporter| async move {
        drop(reporter);
    });

    let mut lt = LoadTest::new();
    lt.add_volume_stage(4, 2, silent)?;
    let summary = lt.start().await?;

    let stats = &summary.stages[0].stats;
    assert_eq!(stats.total_executed, 4);
    assert_eq!(stats.bucket(UNREPORTED_REASON).map(|b| b.count), Some(4));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn progress_callback_sees_stage_lifecycle() -> anyhow::Result<()> {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();

    let cfg = EngineConfig {
        report_interval: Duration::from_millis(100),
        ..EngineConfig::default()
    };
    let mut lt = LoadTest::with_config(cfg)?.with_progress(Arc::new(move |update: ProgressUpdate| {
        sink.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(update);
    }));
    lt.add_rate_stage(20, Duration::from_secs(1), sleeping_unit(Duration::ZERO))?;
    lt.start().await?;

    let updates = updates
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();
    assert!(matches!(updates.first(), Some(ProgressUpdate::StageStarted(_))));
    assert!(matches!(updates.last(), Some(ProgressUpdate::StageFinished(_))));

    let ticks: Vec<_> = updates
        .iter()
        .filter_map(|u| match u {
            ProgressUpdate::Tick { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert!(ticks.len() >= 5, "ticks {}", ticks.len());
    assert!(ticks.iter().all(|p| p.state == StageState::Running));
    assert!(ticks.iter().all(|p| p.percent < 100.0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_progress_callback_does_not_lose_the_summary() -> anyhow::Result<()> {
    let cfg = EngineConfig {
        report_interval: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let mut lt = LoadTest::with_config(cfg)?.with_progress(Arc::new(|update: ProgressUpdate| {
        if let ProgressUpdate::Tick { tick, .. } = update {
            panic!("progress sink failed on tick {tick}");
        }
    }));
    lt.add_volume_stage(20, 2, sleeping_unit(Duration::from_millis(20)))?;
    lt.add_volume_stage(5, 1, sleeping_unit(Duration::ZERO))?;

    let summary = lt.start().await?;

    assert_eq!(summary.stages.len(), 2);
    assert!(summary.stages.iter().all(|s| s.state == StageState::Done));
    assert_eq!(summary.stages[0].stats.total_executed, 20);
    assert_eq!(summary.stages[1].stats.total_executed, 5);
    Ok(())
}
