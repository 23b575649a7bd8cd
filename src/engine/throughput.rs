//! Sustained throughput measurement.
//!
//! A fixed pool of workers keeps requests in flight against one endpoint
//! while a once-per-second sampler turns the shared byte counter into a
//! rate series. Bytes moved during warmup count toward the total but not
//! toward the reported rate.

use crate::cancellation::CancellationToken;
use crate::client::requests::upload;
use crate::client::{DownloadBody, Transport, TransportError};
use crate::engine::config::ThroughputConfig;
use crate::measurements::{mbps, Direction, ThroughputMeasurement};
use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Period of the rate sampler.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// A source of periodic instants.
///
/// Ticks may arrive late or be coalesced; consumers derive rates from the
/// instants they are handed, never from the nominal period.
#[allow(async_fn_in_trait)]
pub trait Ticker {
    async fn tick(&mut self) -> Instant;
}

impl Ticker for Interval {
    async fn tick(&mut self) -> Instant {
        Interval::tick(self).await
    }
}

/// The production ticker: first tick one period after `start`, missed
/// ticks delayed rather than bursted.
pub fn sampler_interval(start: Instant, period: Duration) -> Interval {
    let mut interval = time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Warmup and series bookkeeping for one phase, driven by sampler ticks.
#[derive(Debug, Clone)]
pub struct SustainedWindow {
    duration: Duration,
    warmup: Duration,
    warmup_at: Instant,
    bytes_at_warmup: Option<u64>,
    last_tick: Instant,
    last_bytes: u64,
    series_mbps: Vec<f64>,
}

impl SustainedWindow {
    /// `warmup` is clamped to `duration`.
    pub fn new(started: Instant, duration: Duration, warmup: Duration) -> Self {
        let warmup = warmup.min(duration);

        Self {
            duration,
            warmup,
            warmup_at: started + warmup,
            // Nothing has moved yet when there is no warmup at all.
            bytes_at_warmup: warmup.is_zero().then_some(0),
            last_tick: started,
            last_bytes: 0,
            series_mbps: Vec::new(),
        }
    }

    pub fn on_tick(&mut self, now: Instant, total_bytes: u64) {
        let past_warmup = now >= self.warmup_at;

        if past_warmup && self.bytes_at_warmup.is_none() {
            self.bytes_at_warmup = Some(total_bytes);
        }

        if past_warmup {
            let elapsed = now.saturating_duration_since(self.last_tick);
            let moved = total_bytes.saturating_sub(self.last_bytes);
            self.series_mbps.push(mbps(moved, elapsed));
        }

        self.last_tick = now;
        self.last_bytes = total_bytes;
    }

    pub fn series(&self) -> &[f64] {
        &self.series_mbps
    }

    /// Close the window once every worker has returned.
    pub fn finish(
        self,
        direction: Direction,
        total_bytes: u64,
    ) -> ThroughputMeasurement {
        // Degenerate phases that ended before the first post-warmup tick.
        let bytes_at_warmup = self.bytes_at_warmup.unwrap_or(total_bytes);

        let sustained = self.duration.saturating_sub(self.warmup);
        let sustained_bytes = total_bytes.saturating_sub(bytes_at_warmup);
        let sustained_mbps = if sustained.is_zero() {
            0.0
        } else {
            mbps(sustained_bytes, sustained)
        };

        ThroughputMeasurement {
            direction,
            sustained_mbps,
            series_mbps: self.series_mbps,
            total_bytes,
            bytes_at_warmup,
            sustained_bytes,
            sustained_ms: sustained.as_millis() as u64,
        }
    }
}

/// Runs one download or upload phase.
pub struct ThroughputMeasurer<'a, T> {
    transport: &'a T,
    token: &'a CancellationToken,
    config: &'a ThroughputConfig,
}

impl<'a, T: Transport> ThroughputMeasurer<'a, T> {
    pub fn new(
        transport: &'a T,
        token: &'a CancellationToken,
        config: &'a ThroughputConfig,
    ) -> Self {
        Self { transport, token, config }
    }

    pub async fn measure(&self, direction: Direction) -> ThroughputMeasurement {
        let ticker = sampler_interval(Instant::now(), SAMPLE_PERIOD);
        self.measure_with_ticker(direction, ticker).await
    }

    pub async fn measure_with_ticker<K: Ticker>(
        &self,
        direction: Direction,
        mut ticker: K,
    ) -> ThroughputMeasurement {
        let started = Instant::now();
        let deadline = started + self.config.duration();
        let counter = AtomicU64::new(0);
        let mut window = SustainedWindow::new(
            started,
            self.config.duration(),
            self.config.warmup(),
        );

        let payload = match direction {
            Direction::Upload => {
                upload::payload(self.config.bytes_per_request() as usize)
            }
            Direction::Download => Bytes::new(),
        };

        info!(
            "Measuring {} for {} ms with {} worker(s)",
            direction.as_str(),
            self.config.duration_ms,
            self.config.concurrency
        );

        {
            let workers = join_all((0..self.config.concurrency).map(|id| {
                self.worker(id, direction, &counter, deadline, &payload)
            }));

            let sampler = async {
                loop {
                    let now = ticker.tick().await;
                    window.on_tick(now, counter.load(Ordering::Acquire));
                }
            };

            tokio::select! {
                biased;
                _ = workers => {}
                _ = sampler => {}
            }
        }

        let total_bytes = counter.load(Ordering::Acquire);
        let measurement = window.finish(direction, total_bytes);

        if measurement.sustained_bytes == 0 && !self.token.is_stale() {
            warn!("No bytes moved after warmup during {}", direction.as_str());
        }
        info!(
            "{} finished: {:.2} Mbps sustained, {} bytes total",
            direction.as_str(),
            measurement.sustained_mbps,
            measurement.total_bytes
        );

        measurement
    }

    fn should_stop(&self, counter: &AtomicU64, deadline: Instant) -> bool {
        Instant::now() >= deadline
            || counter.load(Ordering::Acquire) >= self.config.max_bytes
            || self.token.is_stale()
    }

    async fn worker(
        &self,
        id: u32,
        direction: Direction,
        counter: &AtomicU64,
        deadline: Instant,
        payload: &Bytes,
    ) {
        let timeout = self.config.request_timeout();
        let mut requests = 0u32;

        // Failed requests are retried immediately, without backoff.
        while !self.should_stop(counter, deadline) {
            requests += 1;

            let outcome = match direction {
                Direction::Download => {
                    self.token
                        .guard(timeout, self.download_once(counter, deadline))
                        .await
                }
                Direction::Upload => {
                    self.token
                        .guard(timeout, self.upload_once(counter, payload.clone()))
                        .await
                }
            };

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(
                    "{} worker {} request {} failed: {}",
                    direction.as_str(),
                    id,
                    requests,
                    e
                ),
                Err(interrupted) => debug!(
                    "{} worker {} request {}: {}",
                    direction.as_str(),
                    id,
                    requests,
                    interrupted
                ),
            }
        }

        debug!(
            "{} worker {} stopped after {} request(s)",
            direction.as_str(),
            id,
            requests
        );
    }

    async fn download_once(
        &self,
        counter: &AtomicU64,
        deadline: Instant,
    ) -> Result<(), TransportError> {
        let mut body = self.transport.download(self.config.mb_per_request).await?;

        while !self.should_stop(counter, deadline) {
            match time::timeout_at(deadline, body.chunk()).await {
                Ok(Ok(Some(chunk))) => {
                    counter.fetch_add(chunk.len() as u64, Ordering::AcqRel);
                }
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(e),
                // Deadline hit mid-read; the body is dropped unread.
                Err(_) => break,
            }
        }

        Ok(())
    }

    async fn upload_once(
        &self,
        counter: &AtomicU64,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let sent = payload.len() as u64;
        let reply = self.transport.upload(payload).await?;

        if !reply.ok {
            return Err(TransportError::Malformed(
                "upload reply without ok flag".into(),
            ));
        }

        let received = reply.bytes_received.unwrap_or(sent);
        counter.fetch_add(received, Ordering::AcqRel);

        Ok(())
    }
}
