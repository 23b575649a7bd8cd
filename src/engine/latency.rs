//! Round trip sampling against the ping endpoint.

use crate::cancellation::CancellationToken;
use crate::client::Transport;
use crate::measurements::{PingSample, PingSummary};
use log::{debug, warn};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// When to issue the next attempt.
#[derive(Debug, Clone, Copy)]
enum Schedule {
    /// `samples` attempts, `gap` apart, no pause after the last.
    Count { samples: u32, gap: Duration },
    /// Attempts `interval` apart until `deadline`.
    Until { deadline: Instant, interval: Duration },
}

impl Schedule {
    fn wants_attempt(&self, sent: usize) -> bool {
        match *self {
            Schedule::Count { samples, .. } => sent < samples as usize,
            Schedule::Until { deadline, .. } => Instant::now() < deadline,
        }
    }

    /// Pause to take after an attempt, if any.
    fn pause_after(&self, sent: usize) -> Option<Duration> {
        match *self {
            Schedule::Count { samples, gap } => {
                (sent < samples as usize && !gap.is_zero()).then_some(gap)
            }
            Schedule::Until { interval, .. } => {
                (!interval.is_zero()).then_some(interval)
            }
        }
    }
}

/// Issues timed round trips and summarizes them.
///
/// Attempts are strictly sequential. Any failure is recorded as loss and
/// the loop carries on; a stale token ends the loop early.
pub struct LatencySampler<'a, T> {
    transport: &'a T,
    token: &'a CancellationToken,
    timeout: Duration,
}

impl<'a, T: Transport> LatencySampler<'a, T> {
    pub fn new(
        transport: &'a T,
        token: &'a CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self { transport, token, timeout }
    }

    /// Idle latency: exactly `samples` attempts unless canceled.
    pub async fn fixed_count(&self, samples: u32, gap: Duration) -> PingSummary {
        self.sample(Schedule::Count { samples, gap }).await
    }

    /// Loaded latency: attempts until `duration` has elapsed.
    pub async fn for_duration(
        &self,
        duration: Duration,
        interval: Duration,
    ) -> PingSummary {
        let deadline = Instant::now() + duration;
        self.sample(Schedule::Until { deadline, interval }).await
    }

    async fn sample(&self, schedule: Schedule) -> PingSummary {
        let mut samples: Vec<PingSample> = Vec::new();

        while !self.token.is_stale() && schedule.wants_attempt(samples.len()) {
            // Counted as sent before it is issued, so an attempt cut short
            // by cancellation stays a loss.
            samples.push(PingSample::Lost);
            let outcome = self.attempt().await;
            if let Some(last) = samples.last_mut() {
                *last = outcome;
            }

            if self.token.is_stale() {
                break;
            }
            if let Some(pause) = schedule.pause_after(samples.len()) {
                sleep(pause).await;
            }
        }

        let summary = PingSummary::from_samples(&samples);

        if summary.sent > 0 && summary.received == 0 {
            warn!("All {} ping attempt(s) were lost", summary.sent);
        }
        debug!(
            "Ping summary: sent={} received={} median={:?} jitter={:?}",
            summary.sent, summary.received, summary.median_ms, summary.jitter_ms
        );

        summary
    }

    async fn attempt(&self) -> PingSample {
        let started = Instant::now();

        match self.token.guard(self.timeout, self.transport.ping()).await {
            Ok(Ok(reply)) if reply.ok => {
                let ms = started.elapsed().as_secs_f64() * 1000.0;
                debug!("Ping reply in {:.2} ms", ms);
                PingSample::Latency(ms)
            }
            Ok(Ok(_)) => {
                debug!("Ping reply without ok flag, counted as loss");
                PingSample::Lost
            }
            Ok(Err(e)) => {
                debug!("Ping failed: {}", e);
                PingSample::Lost
            }
            Err(interrupted) => {
                debug!("Ping {}", interrupted);
                PingSample::Lost
            }
        }
    }
}
