//! Confidence grading for latency and throughput results.
//!
//! A grade says how much a number can be trusted, not how good the
//! connection is: it reflects sample sufficiency plus loss (latency) or
//! spread (throughput). The thresholds are fixed constants.

use crate::measurements::PingSummary;
use crate::stats::summarize;
use serde::Serialize;
use std::fmt;

/// Coarse A-D quality label.
///
/// Variants are ordered from best to worst, so `A < D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ConfidenceGrade {
    A,
    B,
    C,
    D,
}

impl ConfidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceGrade::A => "A",
            ConfidenceGrade::B => "B",
            ConfidenceGrade::C => "C",
            ConfidenceGrade::D => "D",
        }
    }

    /// Returns a human-readable description of the grade.
    pub fn description(&self) -> &'static str {
        match self {
            ConfidenceGrade::A => "High confidence",
            ConfidenceGrade::B => "Good confidence",
            ConfidenceGrade::C => "Limited confidence",
            ConfidenceGrade::D => "Low confidence",
        }
    }
}

impl fmt::Display for ConfidenceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grade a latency summary by received count and loss percentage.
pub fn ping_confidence(
    summary: Option<&PingSummary>,
) -> Option<ConfidenceGrade> {
    let summary = summary?;

    let grade = if summary.received >= 10 && summary.loss_pct <= 2.0 {
        ConfidenceGrade::A
    } else if summary.received >= 8 && summary.loss_pct <= 5.0 {
        ConfidenceGrade::B
    } else if summary.received >= 5 && summary.loss_pct <= 12.0 {
        ConfidenceGrade::C
    } else {
        ConfidenceGrade::D
    };

    Some(grade)
}

/// Grade a per-second throughput series by sample count and upper spread.
///
/// `spread = (p95 - median) / median`. Ungraded when fewer than two valid
/// samples remain or the median is not positive.
pub fn throughput_confidence(series: &[f64]) -> Option<ConfidenceGrade> {
    let s = summarize(series)?;
    if s.n < 2 || s.median <= 0.0 {
        return None;
    }

    let spread = (s.p95 - s.median) / s.median;

    let grade = if s.n >= 6 && spread <= 0.25 {
        ConfidenceGrade::A
    } else if s.n >= 5 && spread <= 0.45 {
        ConfidenceGrade::B
    } else if s.n >= 3 && spread <= 0.7 {
        ConfidenceGrade::C
    } else {
        ConfidenceGrade::D
    };

    Some(grade)
}
