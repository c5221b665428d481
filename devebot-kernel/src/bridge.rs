//! Bridge dialects.
//!
//! A bridge is instantiated once per dialect entry found in the sandbox
//! `bridges` section. Where those entries live depends on the addressing
//! scheme: full-ref configs use `bridges[bridge][plugin][dialect]`, legacy
//! configs use either `bridges[bridge][dialect]` or `bridges[dialect][bridge]`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use devebot_config::pick;
use devebot_naming::NameResolver;
use devebot_primitives::{
    BridgeAddressing, IssueInspector, IssueKind, IssueRecord, ModuleKind, ModuleRef, Stage,
    UpgradeMode,
};
use devebot_telemetry::LoggingFactory;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{InstantiateArgs, Instance};

const BRIDGES_KEY: &str = "bridges";
const APPLICATION: &str = "application";

/// Everything a bridge constructor receives for one dialect.
#[derive(Debug, Clone)]
pub struct DialectContext {
    /// Full dialect name, `{plugin}/{bridge}/{dialect}`.
    pub name: String,
    /// Dialect name as written in the config.
    pub dialect: String,
    /// Sandbox configuration slice of the dialect.
    pub config: Value,
    /// Profile configuration slice of the dialect; `null` when absent.
    pub profile: Value,
    /// Logging scoped to the dialect.
    pub logging: LoggingFactory,
}

/// Constructor exported by a bridge module.
pub trait BridgeConstructor: Send + Sync {
    /// Builds one dialect.
    ///
    /// # Errors
    ///
    /// Any error is collected as an `instantiating` record for the dialect.
    fn construct(&self, context: &DialectContext) -> anyhow::Result<Instance>;

    /// Whether `dialect` gets its own `{bridge}#{dialect}` logging sector.
    fn logging_branch(&self, _dialect: &str) -> bool {
        true
    }
}

impl<F> BridgeConstructor for F
where
    F: Fn(&DialectContext) -> anyhow::Result<Instance> + Send + Sync,
{
    fn construct(&self, context: &DialectContext) -> anyhow::Result<Instance> {
        (self)(context)
    }
}

/// A bridge module paired with its constructor.
#[derive(Clone)]
pub struct BridgeModule {
    module: ModuleRef,
    constructor: Arc<dyn BridgeConstructor>,
}

impl fmt::Debug for BridgeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeModule")
            .field("module", &self.module.name())
            .finish_non_exhaustive()
    }
}

impl BridgeModule {
    /// Pairs `module` with a constructor.
    #[must_use]
    pub fn new(module: ModuleRef, constructor: Arc<dyn BridgeConstructor>) -> Self {
        Self {
            module,
            constructor,
        }
    }

    /// Pairs `module` with a constructor closure.
    #[must_use]
    pub fn from_fn<F>(module: ModuleRef, constructor: F) -> Self
    where
        F: Fn(&DialectContext) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new(module, Arc::new(constructor))
    }

    /// Returns the module reference.
    #[must_use]
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }
}

/// Legacy layout of the `bridges` section; ignored by full-ref addressing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LegacyShape {
    /// `bridges[bridge][dialect]`.
    #[default]
    BridgeFirst,
    /// `bridges[dialect][bridge]`.
    DialectFirst,
}

/// One dialect entry located in the `bridges` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialectSite {
    /// Bridge key as written.
    pub bridge: String,
    /// Owning plugin key as written, or `application`.
    pub owner: String,
    /// Dialect name.
    pub dialect: String,
    /// Path of the dialect config from the sandbox root.
    pub config_path: Vec<String>,
}

/// Strategy locating dialect entries in the `bridges` section.
pub trait DialectAddressing: Send + Sync + fmt::Debug {
    /// Lists the dialects declared in `bridges`.
    fn locate(&self, bridges: &Value, shape: LegacyShape) -> Vec<DialectSite>;
}

/// `bridges[bridge][plugin][dialect]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullRefAddressing;

impl DialectAddressing for FullRefAddressing {
    fn locate(&self, bridges: &Value, _shape: LegacyShape) -> Vec<DialectSite> {
        let mut sites = Vec::new();
        for (bridge, owners) in objects(bridges) {
            for (owner, dialects) in objects(owners) {
                for (dialect, _) in objects(dialects) {
                    sites.push(DialectSite {
                        bridge: bridge.clone(),
                        owner: owner.clone(),
                        dialect: dialect.clone(),
                        config_path: vec![
                            BRIDGES_KEY.to_owned(),
                            bridge.clone(),
                            owner.clone(),
                            dialect.clone(),
                        ],
                    });
                }
            }
        }
        sites
    }
}

/// Two-level layouts owned by the application.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyAddressing;

impl DialectAddressing for LegacyAddressing {
    fn locate(&self, bridges: &Value, shape: LegacyShape) -> Vec<DialectSite> {
        let mut sites = Vec::new();
        for (outer, entries) in objects(bridges) {
            for (inner, _) in objects(entries) {
                let (bridge, dialect) = match shape {
                    LegacyShape::BridgeFirst => (outer, inner),
                    LegacyShape::DialectFirst => (inner, outer),
                };
                sites.push(DialectSite {
                    bridge: bridge.clone(),
                    owner: APPLICATION.to_owned(),
                    dialect: dialect.clone(),
                    config_path: vec![BRIDGES_KEY.to_owned(), outer.clone(), inner.clone()],
                });
            }
        }
        sites
    }
}

/// Selects the addressing strategy of `mode`.
#[must_use]
pub fn addressing_for(mode: UpgradeMode) -> Box<dyn DialectAddressing> {
    match mode.addressing {
        BridgeAddressing::FullRef => Box::new(FullRefAddressing),
        BridgeAddressing::Legacy => Box::new(LegacyAddressing),
    }
}

/// Object entries whose values are objects; anything else is skipped.
fn objects(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value
        .as_object()
        .into_iter()
        .flat_map(Map::iter)
        .filter(|(_, child)| child.is_object())
}

/// Deferred construction of one dialect.
#[derive(Clone)]
pub struct DialectBlueprint {
    name: String,
    bridge: String,
    bridge_code: String,
    owner: String,
    dialect: String,
    config_path: Vec<String>,
    branch_logging: bool,
    constructor: Arc<dyn BridgeConstructor>,
    inspector: Arc<IssueInspector>,
}

impl fmt::Debug for DialectBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectBlueprint")
            .field("name", &self.name)
            .field("config_path", &self.config_path)
            .field("branch_logging", &self.branch_logging)
            .finish_non_exhaustive()
    }
}

impl DialectBlueprint {
    /// Full name, `{plugin}/{bridge}/{dialect}`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distribution name of the bridge.
    #[must_use]
    pub fn bridge(&self) -> &str {
        &self.bridge
    }

    /// Original name of the owning plugin, or `application`.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Dialect name.
    #[must_use]
    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Path of the dialect config from the sandbox root.
    #[must_use]
    pub fn config_path(&self) -> &[String] {
        &self.config_path
    }

    /// Constructs the dialect.
    ///
    /// Returns `None` when the constructor fails; the failure is collected as
    /// an `instantiating` record.
    pub fn instantiate(&self, args: &InstantiateArgs<'_>) -> Option<Instance> {
        let context = DialectContext {
            name: self.name.clone(),
            dialect: self.dialect.clone(),
            config: pick(args.sandbox_config, &self.config_path)
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
            profile: pick(args.profile_config, &self.config_path)
                .cloned()
                .unwrap_or(Value::Null),
            logging: if self.branch_logging {
                args.logging
                    .branch(&format!("{}#{}", self.bridge_code, self.dialect))
            } else {
                args.logging.clone()
            },
        };

        match self.constructor.construct(&context) {
            Ok(instance) => {
                debug!(dialect = %self.name, "dialect constructed");
                Some(instance)
            }
            Err(err) => {
                warn!(dialect = %self.name, error = %err, "dialect constructor failed");
                self.inspector.collect(
                    IssueRecord::error(Stage::Instantiating, IssueKind::Dialect, &self.name)
                        .with_stack(format!("{err:?}")),
                );
                None
            }
        }
    }
}

/// Builds dialect blueprints from the loaded bridge constructors.
pub struct BridgeLoader {
    resolver: Arc<NameResolver>,
    constructors: HashMap<String, Arc<dyn BridgeConstructor>>,
    inspector: Arc<IssueInspector>,
    addressing: Box<dyn DialectAddressing>,
}

impl fmt::Debug for BridgeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bridges: Vec<_> = self.constructors.keys().collect();
        bridges.sort();
        f.debug_struct("BridgeLoader")
            .field("bridges", &bridges)
            .field("addressing", &self.addressing)
            .finish_non_exhaustive()
    }
}

impl BridgeLoader {
    /// Creates a loader over `bridges`, addressing dialects as `mode` dictates.
    #[must_use]
    pub fn new(
        resolver: Arc<NameResolver>,
        bridges: &[BridgeModule],
        inspector: Arc<IssueInspector>,
        mode: UpgradeMode,
    ) -> Self {
        Self {
            resolver,
            constructors: bridges
                .iter()
                .map(|bridge| {
                    (
                        bridge.module.name().to_owned(),
                        Arc::clone(&bridge.constructor),
                    )
                })
                .collect(),
            inspector,
            addressing: addressing_for(mode),
        }
    }

    /// Builds one blueprint per dialect declared in the `bridges` section
    /// `dialect_options`, keyed by full name.
    ///
    /// Dialects naming an unknown bridge, or a bridge without constructor, are
    /// logged and skipped.
    #[must_use]
    pub fn load_dialects(
        &self,
        dialect_options: &Value,
        shape: LegacyShape,
    ) -> BTreeMap<String, DialectBlueprint> {
        let mut blueprints = BTreeMap::new();
        for site in self.addressing.locate(dialect_options, shape) {
            let Some(bridge) = self.resolver.find(&site.bridge, ModuleKind::Bridge) else {
                warn!(bridge = %site.bridge, dialect = %site.dialect, "unknown bridge; dialect skipped");
                continue;
            };
            let Some(constructor) = self.constructors.get(bridge.name()) else {
                warn!(bridge = bridge.name(), dialect = %site.dialect, "bridge has no constructor; dialect skipped");
                continue;
            };

            let owner = if site.owner == APPLICATION {
                site.owner.clone()
            } else {
                self.resolver.original_name_of(&site.owner, ModuleKind::Plugin)
            };
            let name = format!("{owner}/{}/{}", bridge.name(), site.dialect);
            debug!(dialect = %name, path = ?site.config_path, "dialect located");

            let blueprint = DialectBlueprint {
                name: name.clone(),
                bridge: bridge.name().to_owned(),
                bridge_code: bridge.code().unwrap_or(bridge.name()).to_owned(),
                owner,
                branch_logging: constructor.logging_branch(&site.dialect),
                dialect: site.dialect,
                config_path: site.config_path,
                constructor: Arc::clone(constructor),
                inspector: Arc::clone(&self.inspector),
            };
            blueprints.insert(name, blueprint);
        }
        blueprints
    }
}
