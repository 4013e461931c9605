//! Tracing subscriber setup for binaries and long-running checker jobs.

use std::io;

use tracing_subscriber::EnvFilter;

use crate::types::{Result, StrudexError};

/// Filter used when the caller passes an empty directive list.
pub const DEFAULT_FILTER: &str = "warn";

/// Parses `directives` (`info`, `strudex::registry=debug,warn`, ...) into a
/// filter. Blank input selects [`DEFAULT_FILTER`].
pub fn log_filter(directives: &str) -> Result<EnvFilter> {
    let directives = match directives.trim() {
        "" => DEFAULT_FILTER,
        trimmed => trimmed,
    };
    EnvFilter::try_new(directives)
        .map_err(|err| StrudexError::Invalid(format!("log filter '{directives}': {err}")))
}

/// Installs the process-wide subscriber. Events go to stderr so JSON output
/// on stdout stays clean.
///
/// Fails on a malformed filter or when a subscriber is already installed.
pub fn init_logging(directives: &str) -> Result<()> {
    let filter = log_filter(directives)?;
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| StrudexError::Invalid(format!("subscriber already installed: {err}")))
}
