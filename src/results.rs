//! The terminal aggregate of a completed run.
//!
//! A [`RunResult`] is built exactly once, when the run reaches `done`,
//! and is never modified afterwards. Confidence grades are derived from
//! it at presentation time rather than stored.

use crate::client::ServerInfo;
use crate::engine::config::RunConfig;
use crate::errors::SpeedTestError;
use crate::measurements::{PingSummary, ThroughputMeasurement};
use crate::scoring::{ping_confidence, throughput_confidence, ConfidenceGrade};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Output of one loaded phase: throughput plus the latency sampled
/// alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPhase {
    pub throughput: ThroughputMeasurement,
    pub loaded_ping: PingSummary,
}

/// Complete results from a speed test run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub finished_at: DateTime<Utc>,
    /// Server metadata, when the server answered the info probe.
    pub server: Option<ServerInfo>,
    pub config: RunConfig,
    pub idle_ping: PingSummary,
    pub loaded_download_ping: PingSummary,
    pub loaded_upload_ping: PingSummary,
    pub download: ThroughputMeasurement,
    pub upload: ThroughputMeasurement,
    pub download_bytes: u64,
    pub upload_bytes: u64,
    pub total_bytes: u64,
}

impl RunResult {
    pub fn new(
        config: RunConfig,
        server: Option<ServerInfo>,
        idle_ping: PingSummary,
        download: LoadedPhase,
        upload: LoadedPhase,
    ) -> Self {
        Self::finished_at(Utc::now(), config, server, idle_ping, download, upload)
    }

    pub fn finished_at(
        finished_at: DateTime<Utc>,
        config: RunConfig,
        server: Option<ServerInfo>,
        idle_ping: PingSummary,
        download: LoadedPhase,
        upload: LoadedPhase,
    ) -> Self {
        let download_bytes = download.throughput.total_bytes;
        let upload_bytes = upload.throughput.total_bytes;

        Self {
            finished_at,
            server,
            config,
            idle_ping,
            loaded_download_ping: download.loaded_ping,
            loaded_upload_ping: upload.loaded_ping,
            download: download.throughput,
            upload: upload.throughput,
            download_bytes,
            upload_bytes,
            total_bytes: download_bytes.saturating_add(upload_bytes),
        }
    }

    pub fn grades(&self) -> ResultGrades {
        ResultGrades {
            idle_ping: ping_confidence(Some(&self.idle_ping)),
            loaded_download_ping: ping_confidence(Some(
                &self.loaded_download_ping,
            )),
            loaded_upload_ping: ping_confidence(Some(&self.loaded_upload_ping)),
            download: throughput_confidence(&self.download.series_mbps),
            upload: throughput_confidence(&self.upload.series_mbps),
        }
    }

    /// Loaded median minus idle median, per direction.
    pub fn latency_deltas_ms(&self) -> (Option<f64>, Option<f64>) {
        (
            self.loaded_download_ping.median_delta_ms(&self.idle_ping),
            self.loaded_upload_ping.median_delta_ms(&self.idle_ping),
        )
    }

    /// `speedtest-result-<timestamp>.json`, safe on every filesystem.
    pub fn export_file_name(&self) -> String {
        let iso = self.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        format!("speedtest-result-{}.json", iso.replace([':', '.'], "-"))
    }

    /// Pretty JSON of the result with its grades attached.
    pub fn to_json(&self) -> Result<String, SpeedTestError> {
        let graded = GradedResult { result: self, grades: self.grades() };

        serde_json::to_string_pretty(&graded).map_err(|e| {
            SpeedTestError::new(
                crate::errors::ErrorKind::Unknown,
                format!("failed to serialize result: {}", e),
            )
            .with_source(e)
        })
    }

    /// Write the JSON export to `target`.
    ///
    /// A directory receives a file named by [`Self::export_file_name`];
    /// anything else is used as the file path. Returns the path written.
    pub fn export_json(&self, target: &Path) -> Result<PathBuf, SpeedTestError> {
        let path = if target.is_dir() {
            target.join(self.export_file_name())
        } else {
            target.to_path_buf()
        };

        std::fs::write(&path, self.to_json()?).map_err(|e| {
            SpeedTestError::config(format!(
                "cannot write {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;

        Ok(path)
    }
}

/// Confidence grades for every graded part of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResultGrades {
    pub idle_ping: Option<ConfidenceGrade>,
    pub loaded_download_ping: Option<ConfidenceGrade>,
    pub loaded_upload_ping: Option<ConfidenceGrade>,
    pub download: Option<ConfidenceGrade>,
    pub upload: Option<ConfidenceGrade>,
}

#[derive(Serialize)]
struct GradedResult<'a> {
    #[serde(flatten)]
    result: &'a RunResult,
    grades: ResultGrades,
}
