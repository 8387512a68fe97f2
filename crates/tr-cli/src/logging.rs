use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "warn";

/// Installs the stderr subscriber once per process.
///
/// `level` wins over `RUST_LOG`; with neither, only warnings and errors are shown.
pub(crate) fn init_tracing(level: Option<&str>) {
    TRACING_INIT.call_once(|| {
        let filter = match level {
            Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        };
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}
