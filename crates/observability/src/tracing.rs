//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process: JSON lines to stderr, filtered via
/// `RUST_LOG` (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops). Worker
/// binaries call this once at startup; the queue and handlers only emit
/// through `tracing` macros and the event sink, never install subscribers.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
