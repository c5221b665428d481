//! Application bootstrapping for devebot.
//!
//! Depend on this crate via `cargo add devebot`. It bundles the runtime crates
//! behind feature flags; the default set enables everything needed by
//! [`kernel::Kernel::assemble`].

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use devebot_primitives as primitives;

/// Name resolution between distribution names and codes (enabled by `naming` feature).
#[cfg(feature = "naming")]
pub use devebot_naming as naming;

/// Layered configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use devebot_config as config;

/// Logging factory over `tracing` (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use devebot_telemetry as telemetry;

/// Bootstrap kernel: dialects, gadgets, and the injector (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use devebot_kernel as kernel;
