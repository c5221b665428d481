//! Core shared types for the devebot bootstrapping runtime.

#![warn(missing_docs, clippy::pedantic)]

mod env;
mod error;
mod features;
mod issue;
mod manifest;
mod module_ref;

/// Environment lookups with application-prefixed fallbacks.
pub use env::{EnvBox, EnvSource, MapEnv, ProcessEnv, label_of, split_names};
/// Error type and result alias shared across the runtime.
pub use error::{Error, Result};
/// Upgrade flags and the resolved runtime mode derived from them.
pub use features::{BridgeAddressing, FeatureGate, NamingConvention, UpgradeMode, flags};
/// Diagnostic collection shared by every bootstrap stage.
pub use issue::{
    BarrierOptions, BarrierOutcome, IssueInspector, IssueKind, IssueRecord, ProcessExit,
    RecordingExit, Stage, StdExit,
};
/// Validation metadata declared by plugins and bridges.
pub use manifest::{ConstraintCheck, Manifest, ManifestBuilder};
/// Descriptors of the application, framework, plugins, and bridges.
pub use module_ref::{ModuleKind, ModuleRef, Presets};

/// Short name of the framework; used as its code and as the environment prefix.
pub const FRAMEWORK_NAME: &str = "devebot";

/// Distribution name of the framework itself.
pub const FRAMEWORK_PACKAGE: &str = "devebot";
