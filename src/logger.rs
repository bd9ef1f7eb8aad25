//! Logging setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_DIRECTIVE: &str = "info";

/// Install the process-wide subscriber.
///
/// Output goes to stdout; the level comes from `RUST_LOG` and defaults to
/// `info`. Calling this again after a subscriber is installed does nothing.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_writer(std::io::stdout)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("logger initialized");
    }
}
