//! Tracing subscriber initialisers for binaries embedding the session engine.
//!
//! The engine itself never installs a global subscriber — only emits `tracing` events. This
//! module is a convenience for applications that want the same defaults the reference deployment
//! uses.
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Initialise a pretty, human-readable subscriber reading `RUST_LOG` (default `info`).
///
/// Intended for local development and interactive backtests.
pub fn init_pretty() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .init();
}

/// Initialise a JSON subscriber reading `RUST_LOG` (default `info`).
///
/// Intended for live-trading deployments where logs are shipped to a collector.
pub fn init_json() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(true)
        .init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}
