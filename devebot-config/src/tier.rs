//! Configuration tiers and their accumulated slots.

use std::fmt::{self, Display, Formatter};

use devebot_primitives::EnvBox;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::merge::defaults_deep_all;

/// One of the three configuration categories.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Framework and runtime behavior.
    Profile,
    /// Business and application settings.
    Sandbox,
    /// Method-level interception and mocking rules.
    Texture,
}

impl Tier {
    /// Every tier in loading order.
    pub const ALL: [Self; 3] = [Self::Profile, Self::Sandbox, Self::Texture];

    /// Canonical name, also the default file stem.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Sandbox => "sandbox",
            Self::Texture => "texture",
        }
    }

    /// Environment variable holding the selected variant names.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Profile => "PROFILE",
            Self::Sandbox => "SANDBOX",
            Self::Texture => "TEXTURE",
        }
    }

    /// Whether plugin and bridge sections are reshaped for this tier.
    #[must_use]
    pub const fn is_shaped(self) -> bool {
        matches!(self, Self::Sandbox | Self::Texture)
    }
}

impl Display for Tier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File stems recognized for each tier, in lookup priority order.
///
/// User-declared aliases come first and the canonical name last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierAliases {
    profile: Vec<String>,
    sandbox: Vec<String>,
    texture: Vec<String>,
}

impl Default for TierAliases {
    fn default() -> Self {
        Self::new(Vec::new(), vec!["context".to_owned()], Vec::new())
    }
}

impl TierAliases {
    /// Creates the table from user aliases; canonical names are appended.
    #[must_use]
    pub fn new(profile: Vec<String>, sandbox: Vec<String>, texture: Vec<String>) -> Self {
        fn with_canonical(mut aliases: Vec<String>, tier: Tier) -> Vec<String> {
            aliases.retain(|alias| alias != tier.as_str());
            aliases.push(tier.as_str().to_owned());
            aliases
        }
        Self {
            profile: with_canonical(profile, Tier::Profile),
            sandbox: with_canonical(sandbox, Tier::Sandbox),
            texture: with_canonical(texture, Tier::Texture),
        }
    }

    /// Reads `DEVEBOT_CONFIG_{TIER}_ALIASES`, keeping the defaults for unset tiers.
    #[must_use]
    pub fn from_env(envbox: &EnvBox) -> Self {
        let defaults = Self::default();
        let read = |tier: Tier, fallback: &[String]| {
            envbox
                .framework_list(&format!("CONFIG_{}_ALIASES", tier.env_var()))
                .unwrap_or_else(|| {
                    fallback
                        .iter()
                        .filter(|alias| *alias != tier.as_str())
                        .cloned()
                        .collect()
                })
        };
        Self::new(
            read(Tier::Profile, &defaults.profile),
            read(Tier::Sandbox, &defaults.sandbox),
            read(Tier::Texture, &defaults.texture),
        )
    }

    /// Returns the recognized stems of `tier`.
    #[must_use]
    pub fn of(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Profile => &self.profile,
            Tier::Sandbox => &self.sandbox,
            Tier::Texture => &self.texture,
        }
    }
}

/// Accumulated slots of one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTier {
    /// Framework, plugin, bridge, and application defaults.
    pub default: Value,
    /// Application default plus the selected variants.
    pub expanse: Value,
    /// Final tree: `expanse` over `default`.
    pub mixture: Value,
    /// Variant names applied, starting with `default`.
    pub names: Vec<String>,
}

impl Default for ConfigTier {
    fn default() -> Self {
        Self {
            default: Value::Object(Map::new()),
            expanse: Value::Object(Map::new()),
            mixture: Value::Object(Map::new()),
            names: vec!["default".to_owned()],
        }
    }
}

impl ConfigTier {
    /// Recomputes `mixture` as `expanse`, then the previous mixture, then `default`.
    pub fn refresh_mixture(&mut self) {
        let mut mixture = self.expanse.clone();
        defaults_deep_all(&mut mixture, [&self.mixture, &self.default]);
        self.mixture = mixture;
    }
}
