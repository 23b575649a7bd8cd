//! reactor-speed measures latency, jitter, loss and sustained throughput
//! against a speed test server, and can serve the server side itself.
//!
//! The measurement engine lives in [`engine`]; it talks to a server only
//! through the [`client::Transport`] trait, with [`client::http_client`]
//! providing the reqwest implementation and [`server`] the axum one.

pub mod cancellation;
pub mod client;
pub mod engine;
pub mod errors;
pub mod measurements;
pub mod progress;
pub mod report;
pub mod results;
pub mod scoring;
pub mod server;
pub mod stats;

/// Crate version, with the git hash appended when the build captured one.
pub fn version() -> &'static str {
    match option_env!("REACTOR_SPEED_BUILD_GIT_HASH") {
        Some(hash) => with_revision(hash),
        None => env!("CARGO_PKG_VERSION"),
    }
}

fn with_revision(hash: &'static str) -> &'static str {
    use std::sync::OnceLock;

    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| format!("{} (rev {})", env!("CARGO_PKG_VERSION"), hash))
}
