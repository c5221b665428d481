//! Reshaping of `plugins` and `bridges` sections.
//!
//! Config files may address plugins and bridges under any alias, and older
//! files use a dialect-first bridge layout. While loading, each document is
//! brought into the canonical layout with original names as keys, so that
//! documents from different sources merge onto the same keys. Once a tier is
//! complete the keys are turned into default aliases, which is how consumers
//! look them up.

use std::sync::Arc;

use devebot_naming::NameResolver;
use devebot_primitives::{BridgeAddressing, ModuleKind, NamingConvention, Presets, UpgradeMode};
use serde_json::{Map, Value};
use tracing::debug;

use crate::Tier;

/// Config tag declaring that a module's bridge section is dialect-first.
pub const BRIDGE_DIALECT_TAG: &str = "bridge[dialect-bridge]";

/// Module that contributed a document.
#[derive(Debug, Clone, Copy)]
pub struct ModuleScope<'a> {
    /// Module kind.
    pub kind: ModuleKind,
    /// Owner name used as the plugin level of reshaped bridge sections.
    pub name: &'a str,
    /// Module presets.
    pub presets: &'a Presets,
}

/// Strategy applied to config documents of the shaped tiers.
pub trait ConfigShaper: Send + Sync {
    /// Transforms a freshly loaded document before it is merged.
    fn on_load(&self, tier: Tier, document: Value, scope: &ModuleScope<'_>) -> Value;

    /// Transforms a completed slot (`default`, `expanse`, or `mixture`).
    fn on_finish(&self, tier: Tier, slot: Value) -> Value;
}

/// Keeps plugin and bridge keys as written.
#[derive(Debug, Clone, Copy)]
pub struct VerbatimShaper {
    normalize: bool,
}

impl VerbatimShaper {
    /// Creates the shaper; `normalize` enables the dialect-first rewrite.
    #[must_use]
    pub const fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl ConfigShaper for VerbatimShaper {
    fn on_load(&self, tier: Tier, document: Value, scope: &ModuleScope<'_>) -> Value {
        if tier.is_shaped() && self.normalize {
            normalize_bridges(document, scope)
        } else {
            document
        }
    }

    fn on_finish(&self, _tier: Tier, slot: Value) -> Value {
        slot
    }
}

/// Resolves plugin and bridge keys through the [`NameResolver`].
#[derive(Debug, Clone)]
pub struct StandardShaper {
    resolver: Arc<NameResolver>,
    normalize: bool,
    remap_bridges: bool,
}

impl StandardShaper {
    /// Creates the shaper.
    ///
    /// `remap_bridges` also translates the bridge and plugin levels of the
    /// `bridges` section; it only makes sense with full-ref addressing.
    #[must_use]
    pub fn new(resolver: Arc<NameResolver>, normalize: bool, remap_bridges: bool) -> Self {
        Self {
            resolver,
            normalize,
            remap_bridges,
        }
    }
}

impl ConfigShaper for StandardShaper {
    fn on_load(&self, tier: Tier, document: Value, scope: &ModuleScope<'_>) -> Value {
        if !tier.is_shaped() {
            return document;
        }
        let document = if self.normalize {
            normalize_bridges(document, scope)
        } else {
            document
        };
        remap_sections(document, self.remap_bridges, |name, kind| {
            self.resolver.original_name_of(name, kind)
        })
    }

    fn on_finish(&self, tier: Tier, slot: Value) -> Value {
        if !tier.is_shaped() {
            return slot;
        }
        remap_sections(slot, self.remap_bridges, |name, kind| {
            self.resolver.default_alias_of(name, kind)
        })
    }
}

/// Selects the shaper matching `mode`.
#[must_use]
pub fn shaper_for(mode: UpgradeMode, resolver: Arc<NameResolver>) -> Box<dyn ConfigShaper> {
    match mode.naming {
        NamingConvention::Standardized => Box::new(StandardShaper::new(
            resolver,
            mode.normalizes_bridges(),
            mode.addressing == BridgeAddressing::FullRef,
        )),
        NamingConvention::Verbatim => Box::new(VerbatimShaper::new(mode.normalizes_bridges())),
    }
}

/// Rewrites `bridges[dialect][bridge]` into `bridges[bridge][owner][dialect]`.
///
/// Applies only when the module declares [`BRIDGE_DIALECT_TAG`]. Dialect
/// entries that are not single-key objects are dropped, as are non-object
/// configs.
fn normalize_bridges(mut document: Value, scope: &ModuleScope<'_>) -> Value {
    if !scope.presets.has_tag(BRIDGE_DIALECT_TAG)
        || !matches!(document.get("bridges"), Some(Value::Object(_)))
    {
        return document;
    }
    let Some(Value::Object(old)) = document.get_mut("bridges").map(Value::take) else {
        return document;
    };

    let mut reshaped: Map<String, Value> = Map::new();
    for (dialect_name, entry) in old {
        let Value::Object(entry) = entry else {
            continue;
        };
        if entry.len() != 1 {
            continue;
        }
        let Some((bridge_name, config)) = entry.into_iter().next() else {
            continue;
        };
        if !config.is_object() {
            continue;
        }
        let owners = reshaped
            .entry(bridge_name)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(owners) = owners {
            let dialects = owners
                .entry(scope.name.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(dialects) = dialects {
                dialects.insert(dialect_name, config);
            }
        }
    }

    debug!(module = scope.name, kind = %scope.kind, "bridge section reshaped to full-ref layout");
    if let Value::Object(root) = &mut document {
        root.insert("bridges".into(), Value::Object(reshaped));
    }
    document
}

fn remap_sections<F>(mut document: Value, remap_bridges: bool, name_of: F) -> Value
where
    F: Fn(&str, ModuleKind) -> String,
{
    let Value::Object(root) = &mut document else {
        return document;
    };

    if let Some(Value::Object(plugins)) = root.get_mut("plugins") {
        *plugins = std::mem::take(plugins)
            .into_iter()
            .map(|(name, config)| (name_of(&name, ModuleKind::Plugin), config))
            .collect();
    }

    if remap_bridges {
        if let Some(Value::Object(bridges)) = root.get_mut("bridges") {
            *bridges = std::mem::take(bridges)
                .into_iter()
                .map(|(bridge, owners)| {
                    let owners = match owners {
                        Value::Object(owners) => Value::Object(
                            owners
                                .into_iter()
                                .map(|(owner, dialects)| {
                                    (name_of(&owner, ModuleKind::Plugin), dialects)
                                })
                                .collect(),
                        ),
                        other => other,
                    };
                    (name_of(&bridge, ModuleKind::Bridge), owners)
                })
                .collect();
        }
    }

    document
}
