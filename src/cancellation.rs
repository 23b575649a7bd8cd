//! Generation based cancellation.
//!
//! The run controller owns a [`CancellationRegistry`] and is the only code
//! that advances its generation. Each run receives a [`CancellationToken`]
//! stamped with the generation it started under; samplers and measurers
//! use it to ask "am I still current?" before each unit of work and to
//! register their in-flight requests so a cancel can abort them promptly.

use futures::future::{AbortHandle, Abortable};
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Why a guarded operation did not produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// Aborted through the registry (cancel or restart).
    Aborted,
    /// The per-request timeout expired first.
    TimedOut,
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupted::Aborted => f.write_str("request aborted"),
            Interrupted::TimedOut => f.write_str("request timed out"),
        }
    }
}

/// Current run generation plus the abortable operations of that run.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    generation: AtomicU64,
    next_id: AtomicU64,
    in_flight: Mutex<HashMap<u64, AbortHandle>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generation that is allowed to make progress right now.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of operations currently registered.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Supersede the current generation.
    ///
    /// Every registered operation is aborted and forgotten. Safe to call
    /// any number of times, with or without registered operations.
    pub fn advance(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let aborted = self.abort_all();

        debug!(
            "Advanced to generation {}, aborted {} in-flight operation(s)",
            generation, aborted
        );

        generation
    }

    /// Issue a token bound to the current generation.
    pub fn token(self: &Arc<Self>) -> CancellationToken {
        CancellationToken {
            generation: self.current_generation(),
            registry: Arc::clone(self),
        }
    }

    fn abort_all(&self) -> usize {
        let drained: Vec<AbortHandle> =
            self.lock().drain().map(|(_, handle)| handle).collect();

        for handle in &drained {
            handle.abort();
        }

        drained.len()
    }

    fn register(&self, handle: AbortHandle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, handle);
        id
    }

    fn unregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, AbortHandle>> {
        // The map holds no invariants a panicking holder could break.
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Read-only view of one run's generation plus a registration capability.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    generation: u64,
    registry: Arc<CancellationRegistry>,
}

impl CancellationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the registry has moved past this token's generation.
    pub fn is_stale(&self) -> bool {
        self.registry.current_generation() != self.generation
    }

    /// Run `future` as an abortable, time-limited operation of this run.
    ///
    /// The operation is registered for its whole lifetime and unregistered
    /// when it settles or is dropped. A token that is already stale
    /// refuses to start new work.
    pub async fn guard<F: Future>(
        &self,
        timeout: Duration,
        future: F,
    ) -> Result<F::Output, Interrupted> {
        if self.is_stale() {
            return Err(Interrupted::Aborted);
        }

        let (handle, registration) = AbortHandle::new_pair();
        let _registered = Registered::new(&self.registry, handle.clone());

        // A cancel may have landed between the check above and registering.
        if self.is_stale() {
            return Err(Interrupted::Aborted);
        }

        match tokio::time::timeout(timeout, Abortable::new(future, registration))
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(_aborted)) => Err(Interrupted::Aborted),
            Err(_elapsed) => {
                handle.abort();
                Err(Interrupted::TimedOut)
            }
        }
    }
}

struct Registered<'a> {
    registry: &'a CancellationRegistry,
    id: u64,
}

impl<'a> Registered<'a> {
    fn new(registry: &'a CancellationRegistry, handle: AbortHandle) -> Self {
        let id = registry.register(handle);
        Self { registry, id }
    }
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_current_until_advanced() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = registry.token();
        assert!(!token.is_stale());

        registry.advance();
        assert!(token.is_stale());

        let next = registry.token();
        assert_eq!(next.generation(), token.generation() + 1);
        assert!(!next.is_stale());
    }

    #[test]
    fn test_advance_is_idempotent_with_nothing_registered() {
        let registry = Arc::new(CancellationRegistry::new());
        assert_eq!(registry.advance(), 1);
        assert_eq!(registry.advance(), 2);
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_guard_returns_output_and_unregisters() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = registry.token();

        let out = token.guard(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, Ok(7));
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_times_out() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = registry.token();

        let out = token
            .guard(
                Duration::from_millis(50),
                tokio::time::sleep(Duration::from_secs(10)),
            )
            .await;
        assert_eq!(out, Err(Interrupted::TimedOut));
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_aborts_in_flight_operations() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = registry.token();

        let pending = token.guard(
            Duration::from_secs(60),
            tokio::time::sleep(Duration::from_secs(30)),
        );
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(registry.in_flight(), 1);
            registry.advance();
        };

        let (out, ()) = tokio::join!(pending, cancel);
        assert_eq!(out, Err(Interrupted::Aborted));
        assert_eq!(registry.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stale_token_refuses_new_work() {
        let registry = Arc::new(CancellationRegistry::new());
        let token = registry.token();
        registry.advance();

        let out = token.guard(Duration::from_secs(1), async { 1 }).await;
        assert_eq!(out, Err(Interrupted::Aborted));
    }
}
