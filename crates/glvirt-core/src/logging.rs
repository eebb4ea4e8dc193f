//! Process-wide `tracing` subscriber setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static LOGGING_INIT: Once = Once::new();

/// Install a fmt subscriber filtered by `GLVIRT_LOG`, then `RUST_LOG`, then
/// `info`. Later calls do nothing, as does a call after another subscriber
/// was installed by the host application.
pub fn init() {
    LOGGING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("GLVIRT_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init();
    });
}
