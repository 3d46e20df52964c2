//! # Histogram
//!
//! Min/max estimation for bucketed histograms that don't carry exact values
//!
//! Estimates always stay on the correct side of the mean, a summary with `min > sum / count`
//! would be impossible for consumers.

use super::point::HistogramData;

/// The histogram's own minimum when known and finite, otherwise an estimate from the buckets
pub fn min(histogram: &HistogramData) -> f64 {
    match histogram.min {
        Some(min) if min.is_finite() => min,
        _ => estimate_min(histogram),
    }
}

/// The histogram's own maximum when known and finite, otherwise an estimate from the buckets
pub fn max(histogram: &HistogramData) -> f64 {
    match histogram.max {
        Some(max) if max.is_finite() => max,
        _ => estimate_max(histogram),
    }
}

/// Estimate the minimum from bucket bounds
///
/// Uses the lower bound of the first populated bucket. For the open `(-inf, bounds[0]]` bucket
/// that is the smaller of the first bound and the mean. An empty histogram yields the raw sum.
pub fn estimate_min(histogram: &HistogramData) -> f64 {
    let counts = &histogram.bucket_counts;

    // a single (-inf, +inf) bucket, there are no bounds to look at
    if counts.len() == 1 {
        return if counts[0] > 0 { histogram.mean() } else { histogram.sum };
    }

    match counts.iter().position(|&count| count > 0) {
        Some(0) => bound(histogram, 0).min(histogram.mean()),
        Some(index) => bound(histogram, index - 1),
        None => histogram.sum,
    }
}

/// Estimate the maximum from bucket bounds
///
/// Uses the upper bound of the last populated bucket. For the open `(bounds[n-1], +inf)` bucket
/// that is the greater of the last bound and the mean. An empty histogram yields the raw sum.
pub fn estimate_max(histogram: &HistogramData) -> f64 {
    let counts = &histogram.bucket_counts;

    if counts.len() == 1 {
        return if counts[0] > 0 { histogram.mean() } else { histogram.sum };
    }

    let last = counts.len().saturating_sub(1);
    match counts.iter().rposition(|&count| count > 0) {
        Some(index) if index == last => bound(histogram, index - 1).max(histogram.mean()),
        Some(index) => bound(histogram, index),
        None => histogram.sum,
    }
}

/// Explicit bound at `index`, the serializer rejects histograms where bounds and counts disagree
/// before estimating so the fallback only guards against misuse of the public functions
fn bound(histogram: &HistogramData, index: usize) -> f64 {
    histogram.explicit_bounds.get(index).copied().unwrap_or(histogram.sum)
}
