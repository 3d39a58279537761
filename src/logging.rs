//! Diagnostic logging for the `skiff` binary.
//!
//! The library emits `tracing` events; the binary installs a subscriber that
//! writes them to stderr, filtered by `SKIFF_LOG` (default `warn`).

use std::env;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the filter directives.
pub const LOG_ENV_VAR: &str = "SKIFF_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LoggingError {
    /// Raised when the filter directives cannot be parsed.
    #[error("invalid {LOG_ENV_VAR} value '{directives}': {message}")]
    InvalidFilter {
        /// Directives as given.
        directives: String,
        /// Parser message.
        message: String,
    },
    /// Raised when a global subscriber is already installed.
    #[error("logging initialisation failed: {0}")]
    Init(String),
}

/// Builds the event filter from `directives`, falling back to `warn`.
///
/// # Errors
///
/// Returns [`LoggingError::InvalidFilter`] when the directives do not parse.
pub fn filter_from(directives: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let selected = directives
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES);
    EnvFilter::try_new(selected).map_err(|err| LoggingError::InvalidFilter {
        directives: selected.to_owned(),
        message: err.to_string(),
    })
}

/// Installs the stderr subscriber using the filter from [`LOG_ENV_VAR`].
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn init() -> Result<(), LoggingError> {
    let directives = env::var(LOG_ENV_VAR).ok();
    let filter = filter_from(directives.as_deref())?;
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| LoggingError::Init(err.to_string()))
}
