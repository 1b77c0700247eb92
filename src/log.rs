//! Structured logging for qpar.
//!
//! Log levels:
//! - WARN: Task failures and runs that finished with failures
//! - INFO: Plan-level notifications (run started, pipeline finished)
//! - DEBUG: Layer and task traces
//!
//! Debug mode can be enabled with `init_with_debug(true)`, `debug = true` in
//! the config file, or `QPAR_DEBUG=1`.
//! `QPAR_LOG` takes a full filter directive and overrides both.

use crate::config::Config;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "QPAR_LOG";
pub const DEBUG_ENV: &str = "QPAR_DEBUG";

/// Initialize logging at the default level.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Only the first call installs a subscriber; later calls are no-ops.
pub fn init_with_debug(debug: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug || env_debug())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Initialize logging with debug mode taken from `config.debug`.
pub fn init_from_config(config: &Config) {
    init_with_debug(config.debug);
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "qpar=debug"
    } else {
        "qpar=info"
    }
}
