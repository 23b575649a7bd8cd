//! The measurement engine: latency sampling, sustained throughput and the
//! run controller that sequences them.
//!
//! Nothing in here spawns tasks. Workers, the rate sampler and loaded
//! latency probes are futures joined on the caller's task.

pub mod config;
pub mod controller;
pub mod latency;
pub mod throughput;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{LoadedPingConfig, PingConfig, RunConfig, ThroughputConfig};
pub use controller::{Phase, RunController, RunOutcome, RunStatus};
