#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PercentileError {
    #[error("empty data set")]
    EmptyDataSet,

    #[error("percentile value [{0}] out of bounds")]
    RankOutOfBounds(f64),

    #[error("percentile value [{0}] falls below the first sample")]
    IndexOutOfBounds(f64),
}

/// Nearest-rank percentiles over `samples`, one value per entry of `ranks`.
///
/// Ranks must be within `(0, 100]`. For rank `p` over `n` sorted samples the index is `p * n / 100`;
/// an integral index selects that (1-based) sample, a fractional index above 1 averages the two
/// samples around it.
pub fn percentiles(samples: &[f64], ranks: &[f64]) -> Result<Vec<f64>, PercentileError> {
    if samples.is_empty() {
        return Err(PercentileError::EmptyDataSet);
    }

    if let Some(&p) = ranks.iter().find(|&&p| p.is_nan() || p <= 0.0 || p > 100.0) {
        return Err(PercentileError::RankOutOfBounds(p));
    }

    if let [only] = samples {
        return Ok(vec![*only; ranks.len()]);
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    ranks.iter().map(|&p| rank_value(&sorted, p)).collect()
}

fn rank_value(sorted: &[f64], p: f64) -> Result<f64, PercentileError> {
    // Multiply first: `p / 100.0 * n` turns e.g. 29% of 100 into 28.999...
    let index = p * sorted.len() as f64 / 100.0;

    if index.fract() == 0.0 {
        let i = index as usize;
        return Ok(sorted[i - 1]);
    }

    if index > 1.0 {
        let i = index as usize;
        return Ok((sorted[i - 1] + sorted[i]) / 2.0);
    }

    Err(PercentileError::IndexOutOfBounds(p))
}
