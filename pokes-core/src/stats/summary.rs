use std::fmt;
use std::time::Duration;

use super::PercentileError;
use crate::format::{format_latency, format_rank};

/// Live view of a stats collector: counts and averages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total_executed: u64,
    pub dropped: u64,
    /// Sorted by reason.
    pub buckets: Vec<BucketSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSnapshot {
    pub reason: String,
    pub count: u64,
    pub avg: Duration,
}

/// Final view of a stats collector, computed once when a stage finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub total_executed: u64,
    pub dropped: u64,
    /// Sorted by reason.
    pub buckets: Vec<BucketSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSummary {
    pub reason: String,
    pub count: u64,
    pub avg: Duration,
    /// `(rank, value)` pairs in the requested order.
    pub percentiles: Result<Vec<(f64, Duration)>, PercentileError>,
    /// Retained failure messages (empty for success reasons).
    pub messages: Vec<String>,
    pub messages_discarded: u64,
}

impl StatsSnapshot {
    pub fn bucket(&self, reason: &str) -> Option<&BucketSnapshot> {
        self.buckets.iter().find(|b| b.reason == reason)
    }
}

impl StatsSummary {
    pub fn bucket(&self, reason: &str) -> Option<&BucketSummary> {
        self.buckets.iter().find(|b| b.reason == reason)
    }
}

fn write_totals(f: &mut fmt::Formatter<'_>, total_executed: u64, dropped: u64) -> fmt::Result {
    write!(f, "Total: {total_executed:<11} |")?;
    if dropped > 0 {
        write!(f, " dropped: {dropped}")?;
    }
    writeln!(f)
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_totals(f, self.total_executed, self.dropped)?;
        if self.buckets.is_empty() {
            return writeln!(f, "No metrics");
        }
        for b in &self.buckets {
            writeln!(
                f,
                "{:<18} | count: {:<6} | avg duration: {:<10}",
                b.reason,
                b.count,
                format_latency(b.avg)
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_totals(f, self.total_executed, self.dropped)?;
        if self.buckets.is_empty() {
            return writeln!(f, "No metrics");
        }
        for b in &self.buckets {
            write!(
                f,
                "{:<18} | count: {:<6} | avg duration: {:<10} | ",
                b.reason,
                b.count,
                format_latency(b.avg)
            )?;

            match &b.percentiles {
                Ok(values) => {
                    let rendered = values
                        .iter()
                        .map(|(rank, d)| format!("p{}={}", format_rank(*rank), format_latency(*d)))
                        .collect::<Vec<_>>()
                        .join(" ");
                    writeln!(f, "percentiles: {rendered}")?;
                }
                Err(err) => writeln!(f, "percentiles: cannot compute: {err}")?,
            }

            if let Some(last) = b.messages.last() {
                let total = b.messages.len() as u64 + b.messages_discarded;
                writeln!(f, "{:<18} | last error ({total} total): {last}", "")?;
            }
        }
        Ok(())
    }
}
