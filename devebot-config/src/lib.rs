//! Configuration management for devebot applications.
//!
//! Configuration is split into three tiers (`profile`, `sandbox`, `texture`).
//! Each tier is composed from the defaults shipped by the framework, plugins,
//! and bridges, the application's own default file, and the named variants the
//! caller selects. See [`ConfigLoader::load`] for the precedence rules.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod loader;
mod merge;
mod scanner;
mod schema;
mod shaping;
mod tier;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Configuration, LoaderOptions};
pub use merge::{defaults_deep, defaults_deep_all, pick};
pub use scanner::filter_files;
pub use schema::{JsonSchemaValidator, SchemaValidator, Validation};
pub use shaping::{
    BRIDGE_DIALECT_TAG, ConfigShaper, ModuleScope, StandardShaper, VerbatimShaper, shaper_for,
};
pub use tier::{ConfigTier, Tier, TierAliases};
