//! Progress event types and callback interface.
//!
//! The run controller emits an event for every accepted phase transition
//! so front ends can announce what is happening.

use crate::engine::controller::Phase;

/// Progress events emitted by the run controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The run moved from one phase to another.
    PhaseChange {
        from: Phase,
        to: Phase,
        /// Generation of the run that made the move.
        generation: u64,
    },
}

/// Callback interface for progress updates.
///
/// Called with the controller's state lock held: implementations must be
/// non-blocking and must not call back into the controller.
pub trait ProgressCallback: Send + Sync {
    /// Called when a progress event occurs.
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}
