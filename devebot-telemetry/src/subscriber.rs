//! Global subscriber installation.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directives could not be parsed.
    #[error("invalid log filter `{directives}`: {reason}")]
    InvalidFilter {
        /// Directives as supplied.
        directives: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("log subscriber already installed: {reason}")]
    AlreadyInstalled {
        /// Message from `tracing-subscriber`.
        reason: String,
    },
}

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, or by `fallback` when unset.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for malformed directives and
/// [`TelemetryError::AlreadyInstalled`] when a global subscriber exists.
pub fn install_subscriber(fallback: &str) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback).map_err(|err| TelemetryError::InvalidFilter {
            directives: fallback.to_owned(),
            reason: err.to_string(),
        })?,
    };

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInstalled {
            reason: err.to_string(),
        })
}
