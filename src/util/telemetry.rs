//! Logging setup for binaries and demos.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: scheduler events at `info`,
/// everything else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,light_task_scheduler=info";

/// Install a compact `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to [`DEFAULT_FILTER`]. Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
