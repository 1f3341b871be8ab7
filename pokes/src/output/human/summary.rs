use pokes_core::{LoadTestSummary, StageState};

/// Frames multi-line text in a box drawn with box-drawing characters.
pub(crate) fn render_box(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let rule = "─".repeat(width + 2);

    let mut out = String::new();
    out.push_str(&format!("┌{rule}┐\n"));
    for line in lines {
        let pad = width - line.chars().count();
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{rule}┘\n"));
    out
}

pub(crate) fn render_footer(summary: &LoadTestSummary) -> String {
    let ran = summary
        .stages
        .iter()
        .filter(|s| s.state != StageState::Init)
        .count();
    let dropped: u64 = summary.stages.iter().map(|s| s.stats.dropped).sum();

    let mut out = format!(
        "stages: {ran}/{} executed: {}",
        summary.stages.len(),
        summary.total_executed()
    );
    if dropped > 0 {
        out.push_str(&format!(" dropped: {dropped}"));
    }
    if summary.cancelled {
        out.push_str(" (cancelled)");
    }
    out.push('\n');
    out
}
