//! Order statistics used for latency and throughput summaries.
//!
//! Every selection here is nearest-rank, never interpolated, so the
//! confidence grades computed from them are reproducible bit for bit.

use serde::Serialize;

/// Nearest-rank quantile over an already sorted slice.
///
/// The selected index is `floor(clamp(q, 0, 1) * (n - 1))`. Returns `None`
/// for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    // NaN clamps to 0 rather than poisoning the index.
    let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
    let index = (q * (sorted.len() - 1) as f64).floor() as usize;

    sorted.get(index).copied()
}

/// Median of an unsorted series (nearest-rank at q = 0.5).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    quantile(&sorted, 0.5)
}

/// Median absolute difference between temporally consecutive values.
///
/// `values` must be in arrival order. Needs at least two values.
pub fn jitter(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let diffs: Vec<f64> =
        values.windows(2).map(|pair| (pair[1] - pair[0]).abs()).collect();

    median(&diffs)
}

/// Five-number style summary of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub p95: f64,
    pub n: usize,
}

/// Summarize the finite, non-negative members of `series`.
///
/// Returns `None` when nothing survives the filter.
pub fn summarize(series: &[f64]) -> Option<SeriesSummary> {
    let mut sorted: Vec<f64> = series
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect();

    if sorted.is_empty() {
        return None;
    }

    sorted.sort_by(f64::total_cmp);

    Some(SeriesSummary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median: quantile(&sorted, 0.5)?,
        p95: quantile(&sorted, 0.95)?,
        n: sorted.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantile_median_of_five() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), Some(3.0));
    }

    #[test]
    fn test_quantile_empty_is_none() {
        assert_eq!(quantile(&[], 0.0), None);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[], 1.0), None);
    }

    #[test]
    fn test_quantile_is_not_interpolated() {
        // n = 4, q = 0.5 -> index floor(1.5) = 1
        assert_eq!(quantile(&[10.0, 20.0, 30.0, 40.0], 0.5), Some(20.0));
        // n = 10, q = 0.95 -> index floor(8.55) = 8
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(quantile(&sorted, 0.95), Some(9.0));
    }

    #[test]
    fn test_quantile_clamps_q() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(quantile(&sorted, -1.0), Some(1.0));
        assert_eq!(quantile(&sorted, 7.0), Some(3.0));
    }

    #[test]
    fn test_median_sorts_a_copy() {
        let values = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(median(&values), Some(3.0));
        assert_eq!(values, [5.0, 1.0, 4.0, 2.0, 3.0]);
    }

    #[test]
    fn test_jitter_uses_temporal_order() {
        // |30-10| = 20, |20-30| = 10 -> sorted [10, 20], index 0
        assert_eq!(jitter(&[10.0, 30.0, 20.0]), Some(10.0));
    }

    #[test]
    fn test_jitter_needs_two_values() {
        assert_eq!(jitter(&[]), None);
        assert_eq!(jitter(&[12.0]), None);
        assert_eq!(jitter(&[12.0, 15.0]), Some(3.0));
    }

    #[test]
    fn test_summarize_filters_invalid_values() {
        let summary =
            summarize(&[f64::NAN, -1.0, 4.0, f64::INFINITY, 2.0, 8.0])
                .unwrap();
        assert_eq!(summary.n, 3);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 8.0);
        assert_eq!(summary.median, 4.0);
        assert_eq!(summary.p95, 4.0);
    }

    #[test]
    fn test_summarize_nothing_left() {
        assert!(summarize(&[]).is_none());
        assert!(summarize(&[-3.0, f64::NAN]).is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The quantile is always a member of the input.
        #[test]
        fn quantile_selects_an_existing_value(
            mut values in proptest::collection::vec(0.0f64..1e6, 1..64),
            q in -0.5f64..1.5f64,
        ) {
            values.sort_by(f64::total_cmp);
            let selected = quantile(&values, q).unwrap();
            prop_assert!(values.contains(&selected));
        }

        /// Quantiles never decrease as q grows.
        #[test]
        fn quantile_is_monotonic_in_q(
            mut values in proptest::collection::vec(0.0f64..1e6, 1..64),
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            values.sort_by(f64::total_cmp);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(quantile(&values, lo) <= quantile(&values, hi));
        }

        /// Summary bounds are ordered.
        #[test]
        fn summary_is_ordered(
            values in proptest::collection::vec(0.0f64..1e4, 1..64),
        ) {
            let s = summarize(&values).unwrap();
            prop_assert!(s.min <= s.median);
            prop_assert!(s.median <= s.p95);
            prop_assert!(s.p95 <= s.max);
            prop_assert_eq!(s.n, values.len());
        }
    }
}
