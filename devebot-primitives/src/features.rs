//! Upgrade flags and the runtime mode resolved from them.
//!
//! The set of enabled flags is read once at startup. Components never consult
//! the flags directly; they receive the resolved [`UpgradeMode`] instead.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::EnvBox;

/// Names of the recognized upgrade flags.
pub mod flags {
    /// Dialect configs are addressed as `bridges[bridge][plugin][dialect]`.
    pub const BRIDGE_FULL_REF: &str = "bridge-full-ref";
    /// Plugin and bridge keys in config trees are normalized through the name resolver.
    pub const STANDARDIZING_CONFIG: &str = "standardizing-config";
    /// Module presets (config tags, config directory overrides) are honored.
    pub const PRESETS: &str = "presets";
    /// Gadget constructors run inside their own logging sector.
    pub const GADGET_AROUND_LOG: &str = "gadget-around-log";
    /// Module manifests are used to validate configuration.
    pub const MANIFEST_REFINER: &str = "manifest-refiner";

    /// Flags enabled when nothing else is configured.
    pub const DEFAULTS: &[&str] = &[
        BRIDGE_FULL_REF,
        STANDARDIZING_CONFIG,
        PRESETS,
        GADGET_AROUND_LOG,
        MANIFEST_REFINER,
    ];
}

/// Immutable set of enabled upgrade flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGate {
    enabled: BTreeSet<String>,
}

impl Default for FeatureGate {
    fn default() -> Self {
        Self::new(flags::DEFAULTS.iter().copied())
    }
}

impl FeatureGate {
    /// Creates a gate with exactly the supplied flags enabled.
    #[must_use]
    pub fn new<I, S>(enabled: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a gate with every flag disabled.
    #[must_use]
    pub fn none() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    /// Applies `DEVEBOT_UPGRADE_ENABLED` then `DEVEBOT_UPGRADE_DISABLED` over the defaults.
    #[must_use]
    pub fn from_env(envbox: &EnvBox) -> Self {
        let mut gate = Self::default();
        if let Some(extra) = envbox.framework_list("UPGRADE_ENABLED") {
            gate.enabled.extend(extra);
        }
        if let Some(disabled) = envbox.framework_list("UPGRADE_DISABLED") {
            for flag in disabled {
                gate.enabled.remove(&flag);
            }
        }
        gate
    }

    /// Returns `true` when `flag` is enabled.
    #[must_use]
    pub fn is_upgrade_supported(&self, flag: &str) -> bool {
        self.enabled.contains(flag)
    }

    /// Iterates over the enabled flags in sorted order.
    pub fn enabled(&self) -> impl Iterator<Item = &str> {
        self.enabled.iter().map(String::as_str)
    }
}

/// How dialect configurations are located inside the sandbox tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeAddressing {
    /// `bridges[bridgeCode][pluginAlias][dialectName]`.
    FullRef,
    /// One of the two-level legacy shapes, chosen per call.
    Legacy,
}

/// How plugin and bridge keys inside config trees are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingConvention {
    /// Keys are resolved to original names while merging and to default aliases afterwards.
    Standardized,
    /// Keys are kept exactly as written.
    Verbatim,
}

/// Behavior switches resolved once from a [`FeatureGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpgradeMode {
    /// Dialect addressing scheme.
    pub addressing: BridgeAddressing,
    /// Config key naming convention.
    pub naming: NamingConvention,
    /// Whether module presets are honored.
    pub presets: bool,
    /// Whether gadget constructors get their own logging sector.
    pub gadget_logging: bool,
    /// Whether manifests validate configuration.
    pub manifest_validation: bool,
}

impl UpgradeMode {
    /// Resolves the mode from the enabled flags.
    #[must_use]
    pub fn resolve(gate: &FeatureGate) -> Self {
        Self {
            addressing: if gate.is_upgrade_supported(flags::BRIDGE_FULL_REF) {
                BridgeAddressing::FullRef
            } else {
                BridgeAddressing::Legacy
            },
            naming: if gate.is_upgrade_supported(flags::STANDARDIZING_CONFIG) {
                NamingConvention::Standardized
            } else {
                NamingConvention::Verbatim
            },
            presets: gate.is_upgrade_supported(flags::PRESETS),
            gadget_logging: gate.is_upgrade_supported(flags::GADGET_AROUND_LOG),
            manifest_validation: gate.is_upgrade_supported(flags::MANIFEST_REFINER),
        }
    }

    /// Mode with every upgrade enabled.
    #[must_use]
    pub fn modern() -> Self {
        Self::resolve(&FeatureGate::default())
    }

    /// Mode with every upgrade disabled.
    #[must_use]
    pub fn legacy() -> Self {
        Self::resolve(&FeatureGate::none())
    }

    /// Old dialect-first bridge sections are rewritten only with full-ref addressing and presets.
    #[must_use]
    pub const fn normalizes_bridges(self) -> bool {
        matches!(self.addressing, BridgeAddressing::FullRef) && self.presets
    }
}

impl Default for UpgradeMode {
    fn default() -> Self {
        Self::modern()
    }
}
