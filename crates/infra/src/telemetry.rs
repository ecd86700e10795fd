//! Tracing/logging initialization, grounded on
//! `forgeerp-observability::tracing::init`. Structured JSON logs,
//! configurable via `RUST_LOG`, default to `info`.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times — the coordinator, dispatch tracker and
/// recovery worker all call this independently when run standalone;
/// subsequent calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
