//! Observability and telemetry.
//!
//! The crate emits structured `tracing` events and `metrics` facade
//! counters/histograms throughout the store and gate. A host crawler that
//! wants them exported installs its own subscriber and metrics recorder;
//! [`init_logging`] is a convenience for standalone use and tests.

use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes console logging with an env-filter.
///
/// The filter is taken from `RUST_LOG`, defaulting to `info`. Idempotent:
/// repeated calls (and calls racing a host-installed subscriber) are no-ops.
pub fn init_logging() {
    LOGGING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init rather than init: a host subscriber may already be set
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init();
    });
}
