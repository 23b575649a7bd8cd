//! Measurement value types produced by the engine.
//!
//! All of these are built once per phase and never patched afterwards.

use crate::stats::{jitter, median};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bytes in one mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Convert a byte count moved over `elapsed` into megabits per second.
///
/// Returns 0.0 when no time has elapsed.
pub fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();

    if seconds > 0.0 {
        (bytes as f64 * 8.0) / seconds / 1_000_000.0
    } else {
        0.0
    }
}

/// Outcome of one attempted round trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PingSample {
    /// Round trip time in milliseconds.
    Latency(f64),
    /// Timed out, aborted, transport error or malformed reply.
    Lost,
}

impl PingSample {
    pub fn latency_ms(&self) -> Option<f64> {
        match *self {
            PingSample::Latency(ms) if ms.is_finite() && ms >= 0.0 => Some(ms),
            _ => None,
        }
    }
}

/// Summary of a run of ping attempts.
///
/// `received + lost == sent` always holds. `median_ms` needs one latency
/// and `jitter_ms` needs two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingSummary {
    /// Successful latencies in arrival order, milliseconds.
    pub latencies_ms: Vec<f64>,
    pub sent: u32,
    pub received: u32,
    pub lost: u32,
    pub loss_pct: f64,
    pub median_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
}

impl PingSummary {
    /// Build a summary from every attempt that was issued, in order.
    pub fn from_samples(samples: &[PingSample]) -> Self {
        let latencies_ms: Vec<f64> =
            samples.iter().filter_map(PingSample::latency_ms).collect();

        let sent = samples.len() as u32;
        let received = latencies_ms.len() as u32;
        let lost = sent - received;
        let loss_pct = if sent > 0 {
            lost as f64 / sent as f64 * 100.0
        } else {
            0.0
        };

        Self {
            median_ms: median(&latencies_ms),
            jitter_ms: jitter(&latencies_ms),
            latencies_ms,
            sent,
            received,
            lost,
            loss_pct,
        }
    }

    /// Signed difference between this summary's median and a baseline's.
    pub fn median_delta_ms(&self, baseline: &PingSummary) -> Option<f64> {
        Some(self.median_ms? - baseline.median_ms?)
    }
}

/// Direction of a throughput measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

/// Result of one sustained throughput phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMeasurement {
    pub direction: Direction,
    /// Rate over the post-warmup window.
    pub sustained_mbps: f64,
    /// Per-second instantaneous rates recorded after warmup.
    pub series_mbps: Vec<f64>,
    /// Everything moved, warmup included.
    pub total_bytes: u64,
    pub bytes_at_warmup: u64,
    pub sustained_bytes: u64,
    pub sustained_ms: u64,
}
