//! Observability utilities for devebot.
//!
//! Components receive a [`LoggingFactory`] and branch it into sectors instead
//! of talking to `tracing` directly, so every line carries the sector and the
//! bootstrap instance id.

#![warn(missing_docs, clippy::pedantic)]

mod factory;
mod subscriber;

pub use factory::{InstanceId, Logger, LoggingFactory, TraceEntry, Tracer};
pub use subscriber::{TelemetryError, install_subscriber};
pub use tracing::Level;
