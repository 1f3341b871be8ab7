use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use pokes_core::{StagePolicy, StageProgress, format_latency, pretty_duration};

pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

struct Inner {
    multi: MultiProgress,
    bars: HashMap<usize, ProgressBar>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Inner {
                multi,
                bars: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn start_stage(&self, p: &StageProgress) {
        let mut inner = self.lock();
        let pb = inner.multi.add(ProgressBar::new(100));
        pb.set_style(bar_style());
        pb.set_prefix(format!("stage {}", p.stage));
        pb.set_message(policy_label(&p.policy));
        if let Some(old) = inner.bars.insert(p.stage, pb) {
            old.finish_and_clear();
        }
    }

    pub(crate) fn update(&self, p: &StageProgress) {
        let inner = self.lock();
        let Some(pb) = inner.bars.get(&p.stage) else {
            return;
        };
        pb.set_position(p.percent.clamp(0.0, 100.0) as u64);
        pb.set_message(tick_message(p));
    }

    pub(crate) fn finish_stage(&self, stage: usize) {
        let mut inner = self.lock();
        if let Some(pb) = inner.bars.remove(&stage) {
            pb.finish_and_clear();
        }
    }

    /// Runs `f` with the bars hidden so stdout output does not interleave with them.
    pub(crate) fn suspend<F: FnOnce()>(&self, f: F) {
        let inner = self.lock();
        inner.multi.suspend(f);
    }

    pub(crate) fn finish(&self) {
        let mut inner = self.lock();
        for (_, pb) in inner.bars.drain() {
            pb.finish_and_clear();
        }
        let _ = inner.multi.clear();
    }
}

fn policy_label(policy: &StagePolicy) -> String {
    match *policy {
        StagePolicy::Rate { rate, duration } => {
            format!("rate={rate}/s duration={}", pretty_duration(duration))
        }
        StagePolicy::Volume {
            amount,
            concurrency,
        } => format!("amount={amount} concurrency={concurrency}"),
    }
}

pub(crate) fn tick_message(p: &StageProgress) -> String {
    let mut msg = format!(
        "executed={} workers={} elapsed={}",
        p.stats.total_executed,
        p.live_workers,
        pretty_duration(p.elapsed)
    );
    if let Some(remaining) = p.remaining {
        msg.push_str(&format!(" left={}", pretty_duration(remaining)));
    }
    if p.stats.dropped > 0 {
        msg.push_str(&format!(" dropped={}", p.stats.dropped));
    }
    for b in &p.stats.buckets {
        msg.push_str(&format!(" {}={}/{}", b.reason, b.count, format_latency(b.avg)));
    }
    msg
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}
