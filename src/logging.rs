//! Diagnostic logging.
//!
//! Events go to stderr so command output on stdout stays machine-readable.
//! The filter is read from `BRAVE_LOG` using `tracing-subscriber` directive
//! syntax and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "BRAVE_LOG";

/// Filter applied when `BRAVE_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. Repeated calls are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
    drop(installed);
}
