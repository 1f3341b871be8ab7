use std::sync::Arc;

mod progress;
mod summary;

use pokes_core::{LoadTestSummary, ProgressFn, ProgressUpdate, Stage, StageState};
use progress::HumanProgress;
use summary::{render_box, render_footer};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan_path: &std::path::Path, stages: &[Stage]) {
        println!("plan: {}", plan_path.display());
        for stage in stages {
            print!("{}", stage.progress());
        }
        if !stages.is_empty() {
            println!();
        }
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: ProgressUpdate| match u {
            ProgressUpdate::StageStarted(p) => progress.start_stage(&p),
            ProgressUpdate::Tick { progress: p, .. } => progress.update(&p),
            ProgressUpdate::StageFinished(summary) => {
                progress.finish_stage(summary.stage);
                let rendered = render_box(&summary.to_string());
                progress.suspend(|| print!("{rendered}"));
            }
        }))
    }

    fn print_summary(&self, summary: &LoadTestSummary) -> anyhow::Result<()> {
        self.progress.finish();

        for stage in summary
            .stages
            .iter()
            .filter(|s| s.state == StageState::Init)
        {
            print!("{}", render_box(&stage.to_string()));
        }
        print!("{}", render_footer(summary));
        Ok(())
    }
}
