//! Trimmed statistics over per-window offsets and pair classification.

use crate::models::{IndeterminateReason, OffsetSample, SyncResult, SyncStatus};

/// Fewest offsets that survive trimming with at least one value left.
pub const MIN_OFFSETS: usize = 3;

/// Median and spread of the trimmed offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimmedStats {
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Number of values the statistics were computed over.
    pub kept: usize,
}

/// Drop one minimum and one maximum, then take median and std dev.
///
/// The minimum removed is the first one found; the maximum is the first one
/// found among what remains. Exactly `n - 2` values are kept even when all
/// values are equal. Returns `None` for fewer than three values.
pub fn trimmed_stats(values: &[f64]) -> Option<TrimmedStats> {
    if values.len() < MIN_OFFSETS {
        return None;
    }

    let mut remaining = values.to_vec();
    remaining.remove(position_of(&remaining, |a, b| a < b));
    remaining.remove(position_of(&remaining, |a, b| a > b));

    let median = median(&mut remaining);
    let mean = remaining.iter().sum::<f64>() / remaining.len() as f64;
    let variance = remaining
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / remaining.len() as f64;

    Some(TrimmedStats {
        median,
        std_dev: variance.sqrt(),
        kept: remaining.len(),
    })
}

/// Index of the first extreme according to `better`.
fn position_of(values: &[f64], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if better(v, values[best]) {
            best = i;
        }
    }
    best
}

/// Median, averaging the two middle values for even counts.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Combine per-window offsets into a classified result.
///
/// `Warped` when the trimmed std dev is strictly above `warp_threshold_ms`;
/// statistics are reported for both `Aligned` and `Warped`.
pub fn aggregate(offsets: Vec<OffsetSample>, warp_threshold_ms: f64) -> SyncResult {
    let values: Vec<f64> = offsets.iter().map(|o| o.offset_ms).collect();

    let Some(stats) = trimmed_stats(&values) else {
        let got = offsets.len();
        return SyncResult::indeterminate(offsets, IndeterminateReason::TooFewSamples { got });
    };

    let status = if stats.std_dev > warp_threshold_ms {
        SyncStatus::Warped
    } else {
        SyncStatus::Aligned
    };

    tracing::debug!(
        "Trimmed {} -> {} offsets: median {:.3}ms, std dev {:.3}ms ({})",
        values.len(),
        stats.kept,
        stats.median,
        stats.std_dev,
        status
    );

    SyncResult {
        offsets,
        median_ms: Some(stats.median),
        std_dev_ms: Some(stats.std_dev),
        status,
        indeterminate_reason: None,
    }
}
