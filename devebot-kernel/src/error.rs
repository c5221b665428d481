use devebot_config::ConfigError;
use devebot_naming::NamingError;
use thiserror::Error;

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Hard failures of a bootstrap run.
///
/// Per-module problems are collected by the issue inspector instead; they only
/// surface here through [`KernelError::Barrier`].
#[derive(Debug, Error)]
pub enum KernelError {
    /// Naming rules could not be built.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A barrier found collected failures and the process was kept alive.
    #[error("barrier `{footmark}` failed with {errors} error(s)")]
    Barrier {
        /// Checkpoint that failed.
        footmark: &'static str,
        /// Number of failure records.
        errors: usize,
    },

    /// Two components were registered under one name.
    #[error("component `{name}` is already registered")]
    DuplicateComponent {
        /// Offending name.
        name: String,
    },

    /// A gadget name filter did not compile.
    #[error("invalid gadget filter `{pattern}`")]
    InvalidFilter {
        /// Offending pattern.
        pattern: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },
}
