use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the stderr log subscriber, honoring `RUST_LOG`
pub fn setup_logging() {
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: called first thing in main, before any thread is spawned
        unsafe {
            std::env::set_var(
                "RUST_LOG",
                if cfg!(debug_assertions) {
                    "debug,rayon_core=info"
                } else {
                    "info"
                },
            )
        }
    }

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::debug!("Logging initialized");
}
