//! Run configuration.
//!
//! A [`RunConfig`] is assembled from defaults, an optional JSON file and
//! command line flags, validated once, and never mutated during a run.

use crate::client::requests::download::{MAX_DOWNLOAD_MB, MIN_DOWNLOAD_MB};
use crate::client::requests::upload::MAX_UPLOAD_BYTES;
use crate::errors::SpeedTestError;
use crate::measurements::MIB;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Lower bound on the per-request timeout of throughput workers.
pub const MIN_THROUGHPUT_REQUEST_TIMEOUT: Duration = Duration::from_millis(1500);

/// Idle latency sampling, fixed count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub samples: u32,
    /// Idle sleep between attempts, not after the last one.
    pub gap_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self { samples: 12, gap_ms: 120, timeout_ms: 1200 }
    }
}

impl PingConfig {
    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.gap_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Latency sampling while a throughput phase is running.
///
/// The duration follows the phase and the timeout reuses
/// [`PingConfig::timeout_ms`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadedPingConfig {
    pub interval_ms: u64,
}

impl Default for LoadedPingConfig {
    fn default() -> Self {
        Self { interval_ms: 180 }
    }
}

impl LoadedPingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// One sustained throughput phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputConfig {
    pub duration_ms: u64,
    /// Clamped to `duration_ms` when measuring.
    pub warmup_ms: u64,
    pub concurrency: u32,
    /// Size of one request: download size or upload payload, in MiB.
    pub mb_per_request: u32,
    /// Hard cap on bytes moved by the phase, warmup included.
    pub max_bytes: u64,
}

impl ThroughputConfig {
    pub fn download_defaults() -> Self {
        Self {
            duration_ms: 9000,
            warmup_ms: 2000,
            concurrency: 4,
            mb_per_request: 16,
            max_bytes: 192 * MIB,
        }
    }

    pub fn upload_defaults() -> Self {
        Self {
            duration_ms: 9000,
            warmup_ms: 2000,
            concurrency: 3,
            mb_per_request: 2,
            max_bytes: 48 * MIB,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms.min(self.duration_ms))
    }

    pub fn bytes_per_request(&self) -> u64 {
        u64::from(self.mb_per_request) * MIB
    }

    /// Deadline for one worker request.
    pub fn request_timeout(&self) -> Duration {
        self.duration().max(MIN_THROUGHPUT_REQUEST_TIMEOUT)
    }

    fn validate(&self, name: &str) -> Result<(), SpeedTestError> {
        if self.duration_ms == 0 {
            return Err(invalid(name, "duration_ms must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(invalid(name, "concurrency must be at least 1"));
        }
        if self.max_bytes == 0 {
            return Err(invalid(name, "max_bytes must be greater than 0"));
        }
        if self.mb_per_request == 0 {
            return Err(invalid(name, "mb_per_request must be at least 1"));
        }

        Ok(())
    }
}

/// Partial [`ThroughputConfig`], as read from a file or the command line.
///
/// Download and upload have different defaults, so a partial section is
/// laid over the defaults of its own direction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThroughputOverrides {
    pub duration_ms: Option<u64>,
    pub warmup_ms: Option<u64>,
    pub concurrency: Option<u32>,
    pub mb_per_request: Option<u32>,
    pub max_bytes: Option<u64>,
}

impl ThroughputOverrides {
    pub fn apply_to(&self, config: &mut ThroughputConfig) {
        if let Some(duration_ms) = self.duration_ms {
            config.duration_ms = duration_ms;
        }
        if let Some(warmup_ms) = self.warmup_ms {
            config.warmup_ms = warmup_ms;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(mb_per_request) = self.mb_per_request {
            config.mb_per_request = mb_per_request;
        }
        if let Some(max_bytes) = self.max_bytes {
            config.max_bytes = max_bytes;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfigFile {
    ping: PingConfig,
    loaded_ping: LoadedPingConfig,
    download: ThroughputOverrides,
    upload: ThroughputOverrides,
}

impl From<RunConfigFile> for RunConfig {
    fn from(file: RunConfigFile) -> Self {
        let mut config = RunConfig {
            ping: file.ping,
            loaded_ping: file.loaded_ping,
            ..RunConfig::default()
        };
        file.download.apply_to(&mut config.download);
        file.upload.apply_to(&mut config.upload);

        config
    }
}

/// Everything a run needs to know up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RunConfigFile")]
pub struct RunConfig {
    pub ping: PingConfig,
    pub loaded_ping: LoadedPingConfig,
    pub download: ThroughputConfig,
    pub upload: ThroughputConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ping: PingConfig::default(),
            loaded_ping: LoadedPingConfig::default(),
            download: ThroughputConfig::download_defaults(),
            upload: ThroughputConfig::upload_defaults(),
        }
    }
}

impl RunConfig {
    /// Load a config file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, SpeedTestError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SpeedTestError::config(format!(
                "cannot read config file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;

        Self::from_json_str(&text).map_err(|e| {
            SpeedTestError::config(format!(
                "invalid config file {}: {}",
                path.display(),
                e.message
            ))
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, SpeedTestError> {
        serde_json::from_str(text).map_err(|e| {
            SpeedTestError::config(e.to_string()).with_source(e)
        })
    }

    /// Check every structural invariant the engine relies on.
    pub fn validate(&self) -> Result<(), SpeedTestError> {
        if self.ping.samples == 0 {
            return Err(invalid("ping", "samples must be at least 1"));
        }
        if self.ping.timeout_ms == 0 {
            return Err(invalid("ping", "timeout_ms must be greater than 0"));
        }

        self.download.validate("download")?;
        self.upload.validate("upload")?;

        if !(MIN_DOWNLOAD_MB..=MAX_DOWNLOAD_MB)
            .contains(&self.download.mb_per_request)
        {
            return Err(invalid(
                "download",
                &format!(
                    "mb_per_request must be between {} and {}",
                    MIN_DOWNLOAD_MB, MAX_DOWNLOAD_MB
                ),
            ));
        }
        if self.upload.bytes_per_request() > MAX_UPLOAD_BYTES {
            return Err(invalid(
                "upload",
                &format!(
                    "mb_per_request must be at most {} (server limit)",
                    MAX_UPLOAD_BYTES / MIB
                ),
            ));
        }

        Ok(())
    }

    /// Upper bound on the data a full run may consume.
    pub fn estimated_max_bytes(&self) -> u64 {
        self.download.max_bytes.saturating_add(self.upload.max_bytes)
    }
}

fn invalid(section: &str, message: &str) -> SpeedTestError {
    SpeedTestError::config(format!("invalid {} config: {}", section, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping.samples, 12);
        assert_eq!(config.download.max_bytes, 192 * MIB);
        assert_eq!(config.upload.concurrency, 3);
    }

    #[test]
    fn test_estimated_max_bytes() {
        assert_eq!(RunConfig::default().estimated_max_bytes(), 240 * MIB);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut config = RunConfig::default();
        config.upload.duration_ms = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(err.message.contains("upload"));
    }

    #[test]
    fn test_zero_concurrency_and_cap_rejected() {
        let mut config = RunConfig::default();
        config.download.concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.download.max_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.ping.samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_sizes_bounded_by_server() {
        let mut config = RunConfig::default();
        config.download.mb_per_request = 33;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.upload.mb_per_request = 8;
        assert!(config.validate().is_ok());
        config.upload.mb_per_request = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warmup_clamped_to_duration() {
        let config = ThroughputConfig {
            duration_ms: 1000,
            warmup_ms: 5000,
            ..ThroughputConfig::download_defaults()
        };
        assert_eq!(config.warmup(), Duration::from_millis(1000));
    }

    #[test]
    fn test_request_timeout_floor() {
        let short = ThroughputConfig {
            duration_ms: 200,
            ..ThroughputConfig::upload_defaults()
        };
        assert_eq!(short.request_timeout(), Duration::from_millis(1500));
        assert_eq!(
            ThroughputConfig::upload_defaults().request_timeout(),
            Duration::from_millis(9000)
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RunConfig::from_json_str(
            r#"{"ping":{"samples":5},"download":{"concurrency":2}}"#,
        )
        .unwrap();

        assert_eq!(config.ping.samples, 5);
        assert_eq!(config.ping.gap_ms, 120);
        assert_eq!(config.download.concurrency, 2);
        assert_eq!(config.download.mb_per_request, 16);
        assert_eq!(config.upload, ThroughputConfig::upload_defaults());
    }

    #[test]
    fn test_partial_upload_uses_upload_defaults() {
        let config =
            RunConfig::from_json_str(r#"{"upload":{"duration_ms":4000}}"#)
                .unwrap();

        assert_eq!(config.upload.duration_ms, 4000);
        assert_eq!(config.upload.mb_per_request, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialized_config_reads_back() {
        let mut config = RunConfig::default();
        config.download.warmup_ms = 1500;

        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_json_str(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = RunConfig::from_json_str("{").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
    }
}
