//! Run sequencing.
//!
//! A run walks `idle -> ping -> download -> upload -> done`, with
//! `canceled` and `error` as alternate exits from the three active phases.
//! Every phase change goes through [`transition`] under the state lock,
//! together with a generation check, so a superseded run can never
//! overwrite the state of the run that replaced it.

use crate::cancellation::{CancellationRegistry, CancellationToken};
use crate::client::{ServerInfo, Transport};
use crate::engine::config::RunConfig;
use crate::engine::latency::LatencySampler;
use crate::engine::throughput::ThroughputMeasurer;
use crate::errors::SpeedTestError;
use crate::measurements::Direction;
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::results::{LoadedPhase, RunResult};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Message exposed by the `canceled` state.
pub const CANCELED_MESSAGE: &str = "Run canceled by user.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Ping,
    Download,
    Upload,
    Done,
    Canceled,
    Error,
}

impl Phase {
    /// Ping, download or upload.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Ping | Phase::Download | Phase::Upload)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Canceled | Phase::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Ping => "ping",
            Phase::Download => "download",
            Phase::Upload => "upload",
            Phase::Done => "done",
            Phase::Canceled => "canceled",
            Phase::Error => "error",
        }
    }

    /// One line announcement of what the phase is doing.
    pub fn announcement(&self) -> &'static str {
        match self {
            Phase::Idle => "Speed test is ready to start.",
            Phase::Ping => "Running idle latency and jitter sampling.",
            Phase::Download => {
                "Running sustained download test and loaded latency checks."
            }
            Phase::Upload => {
                "Running sustained upload test and loaded latency checks."
            }
            Phase::Done => "Speed test finished. Results are ready.",
            Phase::Canceled => "Speed test canceled.",
            Phase::Error => "Speed test failed.",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the phase state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    Start,
    PingComplete,
    DownloadComplete,
    UploadComplete,
    Fail,
    Cancel,
}

/// The phase state machine. `None` means the event is not accepted in
/// `phase`.
pub fn transition(phase: Phase, event: RunEvent) -> Option<Phase> {
    use Phase::*;

    match (phase, event) {
        // A new run may start from anywhere, replacing the current one.
        (_, RunEvent::Start) => Some(Ping),
        (Ping, RunEvent::PingComplete) => Some(Download),
        (Download, RunEvent::DownloadComplete) => Some(Upload),
        (Upload, RunEvent::UploadComplete) => Some(Done),
        (Ping | Download | Upload, RunEvent::Fail) => Some(Error),
        (Ping | Download | Upload, RunEvent::Cancel) => Some(Canceled),
        _ => None,
    }
}

/// Externally observable controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub phase: Phase,
    /// Failure description in `error`, fixed message in `canceled`.
    pub message: Option<String>,
    pub generation: u64,
}

/// How a call to [`RunController::run`] ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Box<RunResult>),
    /// Canceled through [`RunController::cancel`].
    Canceled,
    Failed(SpeedTestError),
    /// Replaced by a newer run before it could finish.
    Superseded,
}

#[derive(Debug, Default)]
struct RunState {
    phase: Phase,
    message: Option<String>,
    result: Option<RunResult>,
    canceled_generation: Option<u64>,
}

/// Sequences the phases of a run and owns the run generation.
pub struct RunController<T> {
    transport: T,
    config: RunConfig,
    registry: Arc<CancellationRegistry>,
    state: Mutex<RunState>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl<T: Transport> RunController<T> {
    /// Refuses a config that fails [`RunConfig::validate`].
    pub fn new(transport: T, config: RunConfig) -> Result<Self, SpeedTestError> {
        config.validate()?;

        Ok(Self {
            transport,
            config,
            registry: Arc::new(CancellationRegistry::new()),
            state: Mutex::new(RunState::default()),
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        let state = self.lock();

        RunStatus {
            phase: state.phase,
            message: state.message.clone(),
            generation: self.registry.current_generation(),
        }
    }

    /// The result of the last run that reached `done`, if it is still the
    /// current one.
    pub fn result(&self) -> Option<RunResult> {
        self.lock().result.clone()
    }

    /// Run every phase to completion.
    ///
    /// Calling this while another run is in progress supersedes that run.
    pub async fn run(&self) -> RunOutcome {
        let token = self.begin();
        let ping = &self.config.ping;

        let sampler =
            LatencySampler::new(&self.transport, &token, ping.timeout());
        let (idle_ping, server) = tokio::join!(
            sampler.fixed_count(ping.samples, ping.gap()),
            self.server_info(&token),
        );

        if idle_ping.sent > 0 && idle_ping.received == 0 {
            warn!(
                "Run {}: no reply to any of {} idle ping(s), continuing",
                token.generation(),
                idle_ping.sent
            );
        }
        if let Err(outcome) = self.advance(&token, RunEvent::PingComplete) {
            return outcome;
        }

        let download = self.loaded_phase(&token, Direction::Download).await;
        if let Err(outcome) = self.advance(&token, RunEvent::DownloadComplete) {
            return outcome;
        }

        let upload = self.loaded_phase(&token, Direction::Upload).await;

        let result = RunResult::new(
            self.config.clone(),
            server,
            idle_ping,
            download,
            upload,
        );
        let stored = result.clone();

        let accepted = self.apply_with(
            token.generation(),
            RunEvent::UploadComplete,
            move |state| state.result = Some(stored),
        );

        match accepted {
            Some(_) => {
                info!(
                    "Run {} done: {:.2} Mbps down, {:.2} Mbps up, {} bytes",
                    token.generation(),
                    result.download.sustained_mbps,
                    result.upload.sustained_mbps,
                    result.total_bytes
                );
                RunOutcome::Completed(Box::new(result))
            }
            None => self.unwound(&token),
        }
    }

    /// Cancel the active run, if any.
    ///
    /// Returns false when no run is active. Safe to call repeatedly.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();

        let Some(next) = transition(state.phase, RunEvent::Cancel) else {
            return false;
        };

        let superseded = self.registry.current_generation();
        self.registry.advance();

        let from = state.phase;
        state.phase = next;
        state.message = Some(CANCELED_MESSAGE.to_string());
        state.canceled_generation = Some(superseded);
        self.emit(from, next, superseded);

        info!("Run {} canceled during {}", superseded, from);

        true
    }

    fn begin(&self) -> CancellationToken {
        let mut state = self.lock();

        // Implicit cancel-and-restart of anything still in flight.
        let generation = self.registry.advance();
        let token = self.registry.token();

        let from = state.phase;
        if let Some(next) = transition(from, RunEvent::Start) {
            state.phase = next;
        }
        state.message = None;
        state.result = None;
        state.canceled_generation = None;
        self.emit(from, state.phase, generation);

        info!("Starting run {}", generation);

        token
    }

    async fn server_info(&self, token: &CancellationToken) -> Option<ServerInfo> {
        match token
            .guard(self.config.ping.timeout(), self.transport.server_info())
            .await
        {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                debug!("Server info unavailable: {}", e);
                None
            }
            Err(interrupted) => {
                debug!("Server info {}", interrupted);
                None
            }
        }
    }

    async fn loaded_phase(
        &self,
        token: &CancellationToken,
        direction: Direction,
    ) -> LoadedPhase {
        let config = match direction {
            Direction::Download => &self.config.download,
            Direction::Upload => &self.config.upload,
        };

        let measurer = ThroughputMeasurer::new(&self.transport, token, config);
        let sampler = LatencySampler::new(
            &self.transport,
            token,
            self.config.ping.timeout(),
        );

        let (throughput, loaded_ping) = tokio::join!(
            measurer.measure(direction),
            sampler.for_duration(
                config.duration(),
                self.config.loaded_ping.interval()
            ),
        );

        LoadedPhase { throughput, loaded_ping }
    }

    /// Move the run on to its next phase.
    ///
    /// A refusal while the run is still current means the state machine
    /// and the run disagree about where the run is, which ends it in
    /// `error`.
    fn advance(
        &self,
        token: &CancellationToken,
        event: RunEvent,
    ) -> Result<(), RunOutcome> {
        if self.apply(token.generation(), event).is_some() {
            return Ok(());
        }
        if token.is_stale() {
            return Err(self.unwound(token));
        }

        let phase = self.lock().phase;
        Err(self.fail(
            token,
            SpeedTestError::measurement(format!(
                "run {} cannot take {:?} in phase {}",
                token.generation(),
                event,
                phase
            )),
        ))
    }

    fn fail(&self, token: &CancellationToken, error: SpeedTestError) -> RunOutcome {
        let message = error.to_string();

        let accepted =
            self.apply_with(token.generation(), RunEvent::Fail, move |state| {
                state.message = Some(message)
            });

        match accepted {
            Some(_) => {
                warn!("Run {} failed: {}", token.generation(), error.message);
                RunOutcome::Failed(error)
            }
            None => self.unwound(token),
        }
    }

    /// Outcome for a run whose next transition was refused.
    fn unwound(&self, token: &CancellationToken) -> RunOutcome {
        let state = self.lock();

        if state.canceled_generation == Some(token.generation()) {
            RunOutcome::Canceled
        } else {
            RunOutcome::Superseded
        }
    }

    pub(crate) fn apply(&self, generation: u64, event: RunEvent) -> Option<Phase> {
        self.apply_with(generation, event, |_| {})
    }

    /// Apply `event` on behalf of the run stamped `generation`.
    ///
    /// Refused when that run has been superseded or the state machine does
    /// not accept the event. `update` runs under the same lock.
    fn apply_with(
        &self,
        generation: u64,
        event: RunEvent,
        update: impl FnOnce(&mut RunState),
    ) -> Option<Phase> {
        let mut state = self.lock();

        if self.registry.current_generation() != generation {
            debug!(
                "Dropping {:?} from superseded run {} (current {})",
                event,
                generation,
                self.registry.current_generation()
            );
            return None;
        }

        let from = state.phase;
        let Some(next) = transition(from, event) else {
            debug!("Ignoring {:?} in phase {}", event, from);
            return None;
        };

        state.phase = next;
        update(&mut state);
        self.emit(from, next, generation);

        Some(next)
    }

    fn emit(&self, from: Phase, to: Phase, generation: u64) {
        debug!("Run {}: {} -> {}", generation, from, to);

        if let Some(progress) = &self.progress {
            progress.on_progress(ProgressEvent::PhaseChange { from, to, generation });
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
