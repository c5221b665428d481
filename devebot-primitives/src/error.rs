//! Shared error definitions for devebot primitives.

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// A module reference was rejected.
    #[error("invalid module reference `{name}`: {reason}")]
    InvalidModuleRef {
        /// The offending module name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A manifest document could not be interpreted.
    #[error("invalid manifest: {reason}")]
    InvalidManifest {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
