use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use pokes_core::stats::{BucketSnapshot, BucketSummary};
use pokes_core::{
    LoadTestSummary, ProgressFn, ProgressUpdate, Stage, StagePolicy, StageProgress, StageSummary,
};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan_path: &Path, _stages: &[Stage]) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u: ProgressUpdate| match u {
            ProgressUpdate::StageStarted(p) => emit_json_line(&build_progress_line("stage_started", &p)),
            ProgressUpdate::Tick { progress, .. } => {
                emit_json_line(&build_progress_line("progress", &progress));
            }
            ProgressUpdate::StageFinished(s) => emit_json_line(&build_stage_line(&s)),
        }))
    }

    fn print_summary(&self, summary: &LoadTestSummary) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(summary));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum JsonPolicy {
    Rate { rate: u64, duration_secs: f64 },
    Volume { amount: u64, concurrency: usize },
}

impl From<StagePolicy> for JsonPolicy {
    fn from(policy: StagePolicy) -> Self {
        match policy {
            StagePolicy::Rate { rate, duration } => Self::Rate {
                rate,
                duration_secs: duration.as_secs_f64(),
            },
            StagePolicy::Volume {
                amount,
                concurrency,
            } => Self::Volume {
                amount,
                concurrency,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub stage: usize,
    pub policy: JsonPolicy,
    pub state: String,
    pub elapsed_secs: f64,
    pub remaining_secs: Option<f64>,
    pub percent: f64,
    pub live_workers: usize,
    pub total_executed: u64,
    pub dropped: u64,
    pub reasons: Vec<JsonReasonProgress>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonReasonProgress {
    pub reason: String,
    pub count: u64,
    pub avg_ms: f64,
}

impl From<&BucketSnapshot> for JsonReasonProgress {
    fn from(b: &BucketSnapshot) -> Self {
        Self {
            reason: b.reason.clone(),
            count: b.count,
            avg_ms: b.avg.as_secs_f64() * 1e3,
        }
    }
}

fn build_progress_line(kind: &'static str, p: &StageProgress) -> JsonProgressLine {
    JsonProgressLine {
        kind,
        stage: p.stage,
        policy: p.policy.into(),
        state: p.state.to_string(),
        elapsed_secs: p.elapsed.as_secs_f64(),
        remaining_secs: p.remaining.map(|d| d.as_secs_f64()),
        percent: p.percent,
        live_workers: p.live_workers,
        total_executed: p.stats.total_executed,
        dropped: p.stats.dropped,
        reasons: p.stats.buckets.iter().map(Into::into).collect(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStageLine {
    pub kind: &'static str,
    #[serde(flatten)]
    pub stage: JsonStageSummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStageSummary {
    pub stage: usize,
    pub policy: JsonPolicy,
    pub state: String,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub pool_size: usize,
    pub submitted: u64,
    pub total_executed: u64,
    pub dropped: u64,
    pub reasons: Vec<JsonReasonSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonReasonSummary {
    pub reason: String,
    pub count: u64,
    pub avg_ms: f64,
    /// Keys are rank labels (`p50`, `p99.9`); values in milliseconds.
    pub percentiles_ms: Option<Vec<(String, f64)>>,
    pub percentiles_error: Option<String>,
    pub last_error: Option<String>,
    pub errors_total: u64,
}

impl From<&BucketSummary> for JsonReasonSummary {
    fn from(b: &BucketSummary) -> Self {
        let (percentiles_ms, percentiles_error) = match &b.percentiles {
            Ok(values) => (
                Some(
                    values
                        .iter()
                        .map(|(rank, d)| {
                            (
                                format!("p{}", pokes_core::format_rank(*rank)),
                                d.as_secs_f64() * 1e3,
                            )
                        })
                        .collect(),
                ),
                None,
            ),
            Err(err) => (None, Some(err.to_string())),
        };

        Self {
            reason: b.reason.clone(),
            count: b.count,
            avg_ms: b.avg.as_secs_f64() * 1e3,
            percentiles_ms,
            percentiles_error,
            last_error: b.messages.last().cloned(),
            errors_total: b.messages.len() as u64 + b.messages_discarded,
        }
    }
}

impl From<&StageSummary> for JsonStageSummary {
    fn from(s: &StageSummary) -> Self {
        Self {
            stage: s.stage,
            policy: s.policy.into(),
            state: s.state.to_string(),
            cancelled: s.cancelled,
            elapsed_secs: s.elapsed.as_secs_f64(),
            pool_size: s.pool_size,
            submitted: s.submitted,
            total_executed: s.stats.total_executed,
            dropped: s.stats.dropped,
            reasons: s.stats.buckets.iter().map(Into::into).collect(),
        }
    }
}

fn build_stage_line(s: &StageSummary) -> JsonStageLine {
    JsonStageLine {
        kind: "stage_finished",
        stage: s.into(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub cancelled: bool,
    pub stages: Vec<JsonStageSummary>,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize, Default)]
pub(crate) struct JsonTotals {
    pub stages_run: usize,
    pub total_executed: u64,
    pub dropped: u64,
}

fn build_summary_line(summary: &LoadTestSummary) -> JsonSummaryLine {
    let mut totals = JsonTotals::default();
    let stages = summary
        .stages
        .iter()
        .map(|s| {
            if s.state != pokes_core::StageState::Init {
                totals.stages_run += 1;
            }
            totals.total_executed = totals.total_executed.saturating_add(s.stats.total_executed);
            totals.dropped = totals.dropped.saturating_add(s.stats.dropped);
            JsonStageSummary::from(s)
        })
        .collect();

    JsonSummaryLine {
        kind: "summary",
        cancelled: summary.cancelled,
        stages,
        totals,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
