//! Tracing subscriber setup for test binaries.
//!
//! pom only emits `tracing` events; installing a subscriber is up to the
//! caller. [`init_tracing`] is the one-liner for test suites.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (`RUST_LOG` syntax)
pub const ENV_LOG: &str = "POM_LOG";

/// Install a fmt subscriber filtered by `POM_LOG`, then `RUST_LOG`, then
/// `warn`. Returns `false` if a global subscriber was already set.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok()
}
