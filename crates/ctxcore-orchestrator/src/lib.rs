//! Public façade for the context orchestration core: session lifecycle,
//! compression triggers, snapshots, and emergency recovery, wired over
//! `ctxcore-context`, `ctxcore-storage`, `ctxcore-llm`, and
//! `ctxcore-tokens`.
//!
//! [`Orchestrator`] is the one type callers need: it owns the per-session
//! registry and the durable stores, and every mutation to a session's
//! Active Context goes through it so the session's single serialization
//! point (one `tokio::sync::Mutex` per session) is never bypassed.

#![deny(unsafe_code)]

pub mod emergency;
pub mod errors;
pub mod orchestrator;
pub mod session;

pub use errors::{OrchestratorError, Result};
pub use orchestrator::Orchestrator;
pub use session::StartSessionConfig;

/// Initialize the global `tracing` subscriber with stderr output.
///
/// Call once at process startup; later calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn");
        init_subscriber("debug");
    }
}
