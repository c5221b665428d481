//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the configuration loader.
///
/// Per-file problems are collected by the issue inspector instead; these
/// variants cover conditions that stop the whole load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config directory exists but cannot be listed.
    #[error("cannot scan config directory {}: {source}", path.display())]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file filter pattern is invalid.
    #[error("invalid file pattern `{pattern}`: {source}")]
    Pattern {
        /// Pattern as supplied.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
    /// Failures were collected before the barrier and the exit request returned.
    #[error("configuration barrier failed with {errors} error(s)")]
    Barrier {
        /// Number of failure records.
        errors: usize,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
