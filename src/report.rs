//! Human readable rendering of run results.
//!
//! JSON output lives on [`RunResult::to_json`]; this module renders the
//! text report and decides which of the two a run prints.

use crate::engine::controller::Phase;
use crate::measurements::{PingSummary, ThroughputMeasurement, MIB};
use crate::results::RunResult;
use crate::scoring::ConfidenceGrade;
use crate::stats::summarize;
use colored::{Color, Colorize};
use std::fmt::Write;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Structured JSON only
    Json,
    /// Text report with ANSI colors
    Colored,
    /// Text report without escape codes
    Plain,
}

impl OutputMode {
    /// `--json` wins; otherwise color only when stdout is a terminal.
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            OutputMode::Json
        } else if is_tty {
            OutputMode::Colored
        } else {
            OutputMode::Plain
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, OutputMode::Json)
    }
}

/// Get color for speed value based on thresholds.
///
/// - Green: >= 100 Mbps (fast)
/// - Yellow: 25-100 Mbps (moderate)
/// - Red: < 25 Mbps (slow)
pub fn speed_color(speed_mbps: f64) -> Color {
    if speed_mbps >= 100.0 {
        Color::Green
    } else if speed_mbps >= 25.0 {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn grade_color(grade: ConfidenceGrade) -> Color {
    match grade {
        ConfidenceGrade::A => Color::Green,
        ConfidenceGrade::B => Color::Cyan,
        ConfidenceGrade::C => Color::Yellow,
        ConfidenceGrade::D => Color::Red,
    }
}

/// Format speed value with 2 decimal places.
pub fn format_speed(speed_mbps: f64) -> String {
    format!("{:.2} Mbps", speed_mbps)
}

/// Format latency value with 2 decimal places, or `-` when absent.
pub fn format_latency(latency_ms: Option<f64>) -> String {
    match latency_ms {
        Some(ms) if ms.is_finite() => format!("{:.2} ms", ms),
        _ => "-".to_string(),
    }
}

/// Latency difference with an explicit sign.
pub fn format_signed_latency(delta_ms: Option<f64>) -> String {
    match delta_ms {
        Some(ms) if ms.is_finite() => format!("{:+.2} ms", ms),
        _ => "-".to_string(),
    }
}

pub fn format_mib(bytes: u64) -> String {
    format!("{:.1} MiB", bytes as f64 / MIB as f64)
}

fn format_grade(grade: Option<ConfidenceGrade>) -> String {
    match grade {
        Some(grade) => format!("[{}]", grade)
            .color(grade_color(grade))
            .bold()
            .to_string(),
        None => "[-]".dimmed().to_string(),
    }
}

/// Banner printed when a run enters `phase`.
pub fn phase_banner(phase: Phase) -> String {
    let label = format!("[{}]", phase.as_str()).bold();

    let label = match phase {
        Phase::Done => label.green(),
        Phase::Canceled => label.yellow(),
        Phase::Error => label.red(),
        _ => label.bright_blue(),
    };

    format!("{} {}", label, phase.announcement())
}

/// Full text report of a completed run.
pub fn render_text(result: &RunResult) -> String {
    let grades = result.grades();
    let (download_delta, upload_delta) = result.latency_deltas_ms();
    let mut out = String::new();

    if let Some(server) = &result.server {
        let _ = writeln!(
            out,
            "{} {} {}",
            "Server:".bold().white(),
            server.host.bright_blue(),
            format!("({}, {})", server.region, server.runtime).bright_blue()
        );
    }

    let _ = writeln!(
        out,
        "{} {} {} {} {}",
        "Idle latency:".bold().white(),
        format_latency(result.idle_ping.median_ms),
        format!("jitter {}", format_latency(result.idle_ping.jitter_ms)),
        loss(&result.idle_ping),
        format_grade(grades.idle_ping)
    );

    write_throughput(
        &mut out,
        "Download:",
        &result.download,
        format_grade(grades.download),
    );
    write_loaded(
        &mut out,
        &result.loaded_download_ping,
        download_delta,
        format_grade(grades.loaded_download_ping),
    );

    write_throughput(
        &mut out,
        "Upload:",
        &result.upload,
        format_grade(grades.upload),
    );
    write_loaded(
        &mut out,
        &result.loaded_upload_ping,
        upload_delta,
        format_grade(grades.loaded_upload_ping),
    );

    let _ = writeln!(
        out,
        "{} {} ({} down, {} up)",
        "Data used:".bold().white(),
        format_mib(result.total_bytes),
        format_mib(result.download_bytes),
        format_mib(result.upload_bytes)
    );

    out
}

fn loss(summary: &PingSummary) -> String {
    format!(
        "loss {:.1}% ({}/{})",
        summary.loss_pct, summary.lost, summary.sent
    )
}

fn write_throughput(
    out: &mut String,
    label: &str,
    measurement: &ThroughputMeasurement,
    grade: String,
) {
    let speed = measurement.sustained_mbps;

    let _ = writeln!(
        out,
        "{} {} {}",
        label.bold().white(),
        format_speed(speed).color(speed_color(speed)).bold(),
        grade
    );

    match summarize(&measurement.series_mbps) {
        Some(s) => {
            let _ = writeln!(
                out,
                "  per second: min {:.1} / median {:.1} / p95 {:.1} / max {:.1} Mbps over {} sample(s)",
                s.min, s.median, s.p95, s.max, s.n
            );
        }
        None => {
            let _ = writeln!(out, "  per second: no samples after warmup");
        }
    }
}

fn write_loaded(
    out: &mut String,
    summary: &PingSummary,
    delta_ms: Option<f64>,
    grade: String,
) {
    let _ = writeln!(
        out,
        "  loaded latency: {} ({} vs idle) {} {}",
        format_latency(summary.median_ms),
        format_signed_latency(delta_ms),
        loss(summary),
        grade
    );
}
