//! In-memory transports for engine tests.
//!
//! Every fake awaits a timer on each call, including failures, so that
//! tokio's paused clock can auto-advance instead of spinning.

use crate::client::{
    DownloadBody, PingReply, ServerInfo, Transport, TransportError, UploadReply,
};
use bytes::Bytes;
use http::StatusCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;

static ZEROS: [u8; 64 * 1024] = [0; 64 * 1024];

/// Tunable fake server.
#[derive(Debug)]
pub(crate) struct FakeTransport {
    pub ping_delay: Duration,
    /// Ping attempts (1-indexed) that fail with a transport error.
    pub failing_pings: Vec<u32>,
    /// Every ping fails.
    pub pings_fail: bool,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub downloads_fail: bool,
    pub upload_delay: Duration,
    pub uploads_fail: bool,
    /// Whether upload replies carry `bytesReceived`.
    pub report_upload_bytes: bool,
    pub(crate) pings: AtomicU32,
    pub(crate) downloads: AtomicU32,
    pub(crate) uploads: AtomicU32,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            ping_delay: Duration::from_millis(10),
            failing_pings: Vec::new(),
            pings_fail: false,
            chunk_size: ZEROS.len(),
            chunk_delay: Duration::from_millis(10),
            downloads_fail: false,
            upload_delay: Duration::from_millis(100),
            uploads_fail: false,
            report_upload_bytes: true,
            pings: AtomicU32::new(0),
            downloads: AtomicU32::new(0),
            uploads: AtomicU32::new(0),
        }
    }
}

impl FakeTransport {
    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct FakeBody {
    remaining: u64,
    chunk_size: usize,
    delay: Duration,
}

impl DownloadBody for FakeBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        sleep(self.delay).await;

        if self.remaining == 0 {
            return Ok(None);
        }

        let len = (self.chunk_size as u64).min(self.remaining) as usize;
        self.remaining -= len as u64;

        Ok(Some(Bytes::from_static(&ZEROS[..len])))
    }
}

impl Transport for FakeTransport {
    type Body = FakeBody;

    async fn ping(&self) -> Result<PingReply, TransportError> {
        let attempt = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.ping_delay).await;

        if self.pings_fail || self.failing_pings.contains(&attempt) {
            return Err(TransportError::Network("connection reset".into()));
        }

        Ok(PingReply {
            ok: true,
            server_time: 0,
            iso: "1970-01-01T00:00:00.000Z".into(),
        })
    }

    async fn download(&self, mb: u32) -> Result<FakeBody, TransportError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        if self.downloads_fail {
            sleep(self.chunk_delay).await;
            return Err(TransportError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }

        Ok(FakeBody {
            remaining: u64::from(mb) * 1024 * 1024,
            chunk_size: self.chunk_size.clamp(1, ZEROS.len()),
            delay: self.chunk_delay,
        })
    }

    async fn upload(
        &self,
        payload: Bytes,
    ) -> Result<UploadReply, TransportError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        sleep(self.upload_delay).await;

        if self.uploads_fail {
            return Err(TransportError::Status(StatusCode::PAYLOAD_TOO_LARGE));
        }

        Ok(UploadReply {
            ok: true,
            bytes_received: self
                .report_upload_bytes
                .then_some(payload.len() as u64),
            iso: None,
        })
    }

    async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        sleep(self.ping_delay).await;

        Ok(ServerInfo {
            region: "test".into(),
            runtime: "rust".into(),
            host: "fake.test".into(),
            iso: "1970-01-01T00:00:00.000Z".into(),
        })
    }
}
