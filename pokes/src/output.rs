use crate::cli::OutputFormat;
use std::path::Path;

use pokes_core::{LoadTestSummary, ProgressFn, Stage};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan_path: &Path, stages: &[Stage]);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, summary: &LoadTestSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
