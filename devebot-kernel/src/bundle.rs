//! Gadgets: services, triggers, and routines contributed by plugins and the application.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use devebot_config::pick;
use devebot_naming::NameResolver;
use devebot_primitives::{IssueInspector, IssueKind, IssueRecord, ModuleKind, ModuleRef, Stage};
use devebot_telemetry::LoggingFactory;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Injector, InstantiateArgs, Instance, KernelError, KernelResult};

const PLUGINS_KEY: &str = "plugins";
const APPLICATION: &str = "application";

/// Role of a gadget.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum GadgetKind {
    /// Long-lived component other gadgets depend on.
    Service,
    /// Entry point reacting to external events.
    Trigger,
    /// Command runnable on demand.
    Routine,
}

impl GadgetKind {
    /// Instantiation order.
    pub const ALL: [Self; 3] = [Self::Service, Self::Trigger, Self::Routine];

    const fn issue_kind(self) -> IssueKind {
        match self {
            Self::Service => IssueKind::Service,
            Self::Trigger => IssueKind::Trigger,
            Self::Routine => IssueKind::Routine,
        }
    }
}

/// Everything a gadget constructor receives.
pub struct GadgetContext<'a> {
    /// Full gadget name, `{plugin}/{gadget}`.
    pub name: &'a str,
    /// Sandbox configuration of the owning plugin or the application.
    pub config: &'a Value,
    /// Profile configuration of the owner; `null` when absent.
    pub profile: &'a Value,
    /// Logging scoped to the gadget.
    pub logging: LoggingFactory,
    /// Components built so far.
    pub injector: &'a Injector,
}

impl fmt::Debug for GadgetContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GadgetContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("logging", &self.logging)
            .finish_non_exhaustive()
    }
}

/// Constructor of one gadget.
pub type GadgetConstructor =
    Arc<dyn Fn(&GadgetContext<'_>) -> anyhow::Result<Instance> + Send + Sync>;

/// A gadget declared by a plugin or the application.
#[derive(Clone)]
pub struct GadgetDescriptor {
    kind: GadgetKind,
    name: String,
    constructor: GadgetConstructor,
}

impl fmt::Debug for GadgetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GadgetDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GadgetDescriptor {
    /// Declares a gadget.
    #[must_use]
    pub fn new<F>(kind: GadgetKind, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&GadgetContext<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self {
            kind,
            name: name.into(),
            constructor: Arc::new(constructor),
        }
    }

    /// Declares a service.
    #[must_use]
    pub fn service<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&GadgetContext<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new(GadgetKind::Service, name, constructor)
    }

    /// Declares a trigger.
    #[must_use]
    pub fn trigger<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&GadgetContext<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new(GadgetKind::Trigger, name, constructor)
    }

    /// Declares a routine.
    #[must_use]
    pub fn routine<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&GadgetContext<'_>) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new(GadgetKind::Routine, name, constructor)
    }

    /// Returns the gadget kind.
    #[must_use]
    pub const fn kind(&self) -> GadgetKind {
        self.kind
    }

    /// Returns the gadget name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Gadgets of one plugin, or of the application when `module` is the application.
#[derive(Clone, Debug)]
pub struct Bundle {
    module: ModuleRef,
    gadgets: Vec<GadgetDescriptor>,
}

impl Bundle {
    /// Creates a bundle owned by `module`.
    #[must_use]
    pub fn new(module: ModuleRef, gadgets: Vec<GadgetDescriptor>) -> Self {
        Self { module, gadgets }
    }

    /// Returns the owning module.
    #[must_use]
    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    /// Returns the declared gadgets.
    #[must_use]
    pub fn gadgets(&self) -> &[GadgetDescriptor] {
        &self.gadgets
    }
}

/// Deferred construction of one gadget.
#[derive(Clone)]
pub struct GadgetBlueprint {
    name: String,
    kind: GadgetKind,
    config_path: Vec<String>,
    sector: Option<String>,
    constructor: GadgetConstructor,
    inspector: Arc<IssueInspector>,
}

impl fmt::Debug for GadgetBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GadgetBlueprint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config_path", &self.config_path)
            .field("sector", &self.sector)
            .finish_non_exhaustive()
    }
}

impl GadgetBlueprint {
    /// Full name, `{plugin}/{gadget}`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gadget kind.
    #[must_use]
    pub const fn kind(&self) -> GadgetKind {
        self.kind
    }

    /// Path of the owner's config from the sandbox root.
    #[must_use]
    pub fn config_path(&self) -> &[String] {
        &self.config_path
    }

    /// Constructs the gadget.
    ///
    /// Returns `None` when the constructor fails; the failure is collected as
    /// an `instantiating` record of the gadget's kind.
    pub fn instantiate(&self, args: &InstantiateArgs<'_>) -> Option<Instance> {
        let empty = Value::Object(Map::new());
        let null = Value::Null;
        let context = GadgetContext {
            name: &self.name,
            config: pick(args.sandbox_config, &self.config_path).unwrap_or(&empty),
            profile: pick(args.profile_config, &self.config_path).unwrap_or(&null),
            logging: match &self.sector {
                Some(sector) => args.logging.branch(sector),
                None => args.logging.clone(),
            },
            injector: args.injector,
        };

        match (self.constructor)(&context) {
            Ok(instance) => {
                debug!(gadget = %self.name, kind = ?self.kind, "gadget constructed");
                Some(instance)
            }
            Err(err) => {
                warn!(gadget = %self.name, error = %err, "gadget constructor failed");
                self.inspector.collect(
                    IssueRecord::error(Stage::Instantiating, self.kind.issue_kind(), &self.name)
                        .with_stack(format!("{err:?}")),
                );
                None
            }
        }
    }
}

/// Builds gadget blueprints from bundles.
pub struct BundleLoader {
    resolver: Arc<NameResolver>,
    inspector: Arc<IssueInspector>,
    gadget_logging: bool,
}

impl fmt::Debug for BundleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleLoader")
            .field("gadget_logging", &self.gadget_logging)
            .finish_non_exhaustive()
    }
}

impl BundleLoader {
    /// Creates a loader; `gadget_logging` gives each gadget its own sector.
    #[must_use]
    pub fn new(
        resolver: Arc<NameResolver>,
        inspector: Arc<IssueInspector>,
        gadget_logging: bool,
    ) -> Self {
        Self {
            resolver,
            inspector,
            gadget_logging,
        }
    }

    /// Builds one blueprint per gadget, keyed by full name.
    ///
    /// When `filter` is set, only gadgets whose name matches it are kept.
    /// A gadget declared twice under one owner keeps its first declaration.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidFilter`] when `filter` does not compile.
    pub fn load_gadgets(
        &self,
        bundles: &[Bundle],
        filter: Option<&str>,
    ) -> KernelResult<BTreeMap<String, GadgetBlueprint>> {
        let filter = filter
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| KernelError::InvalidFilter {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
            .transpose()?;

        let mut blueprints = BTreeMap::new();
        for bundle in bundles {
            let (owner, alias, config_path) = self.owner_of(&bundle.module);
            for gadget in &bundle.gadgets {
                if filter.as_ref().is_some_and(|re| !re.is_match(&gadget.name)) {
                    debug!(owner = %owner, gadget = %gadget.name, "gadget filtered out");
                    continue;
                }
                let name = format!("{owner}/{}", gadget.name);
                if blueprints.contains_key(&name) {
                    warn!(gadget = %name, "gadget declared twice; later declaration ignored");
                    continue;
                }
                let blueprint = GadgetBlueprint {
                    name: name.clone(),
                    kind: gadget.kind,
                    config_path: config_path.clone(),
                    sector: self
                        .gadget_logging
                        .then(|| format!("{alias}/{}", gadget.name)),
                    constructor: Arc::clone(&gadget.constructor),
                    inspector: Arc::clone(&self.inspector),
                };
                blueprints.insert(name, blueprint);
            }
        }
        Ok(blueprints)
    }

    /// Full-name prefix, logging alias, and config path of a bundle owner.
    fn owner_of(&self, module: &ModuleRef) -> (String, String, Vec<String>) {
        if module.kind() == ModuleKind::Application {
            return (
                APPLICATION.to_owned(),
                APPLICATION.to_owned(),
                vec![APPLICATION.to_owned()],
            );
        }
        let alias = self
            .resolver
            .default_alias_of(module.name(), ModuleKind::Plugin);
        (
            module.name().to_owned(),
            alias.clone(),
            vec![PLUGINS_KEY.to_owned(), alias],
        )
    }
}

#[cfg(test)]
mod tests {
    use devebot_primitives::RecordingExit;
    use serde_json::json;

    use super::*;
    use crate::instance;

    fn setup() -> (Arc<NameResolver>, Arc<IssueInspector>, Bundle, Bundle) {
        let inspector = Arc::new(IssueInspector::new(Arc::new(RecordingExit::new())));
        let plugin = ModuleRef::plugin("devebot-plugin-mail-sender", "/opt/mail").unwrap();
        let resolver =
            Arc::new(NameResolver::new(vec![plugin], Vec::new(), &inspector).unwrap());
        let plugin_bundle = Bundle::new(
            resolver.plugin_refs()[0].clone(),
            vec![
                GadgetDescriptor::service("sender", |ctx: &GadgetContext<'_>| {
                    Ok(instance((ctx.config.clone(), ctx.logging.sector().to_owned())))
                }),
                GadgetDescriptor::routine("purge", |_ctx: &GadgetContext<'_>| {
                    anyhow::bail!("purge is broken")
                }),
            ],
        );
        let app_bundle = Bundle::new(
            ModuleRef::new("demo-app", "/srv/demo", ModuleKind::Application).unwrap(),
            vec![GadgetDescriptor::trigger("web", |ctx: &GadgetContext<'_>| {
                Ok(instance(ctx.config.clone()))
            })],
        );
        (resolver, inspector, plugin_bundle, app_bundle)
    }

    #[test]
    fn gadgets_are_keyed_by_owner() {
        let (resolver, inspector, plugin, app) = setup();
        let loader = BundleLoader::new(resolver, inspector, true);
        let blueprints = loader.load_gadgets(&[plugin, app], None).unwrap();
        let names: Vec<_> = blueprints.keys().cloned().collect();
        assert_eq!(
            names,
            [
                "application/web",
                "devebot-plugin-mail-sender/purge",
                "devebot-plugin-mail-sender/sender"
            ]
        );
        assert_eq!(
            blueprints["devebot-plugin-mail-sender/sender"].config_path(),
            ["plugins", "mailSender"]
        );
        assert_eq!(blueprints["application/web"].config_path(), ["application"]);
    }

    #[test]
    fn service_receives_plugin_slice_and_sector() {
        let (resolver, inspector, plugin, _) = setup();
        let loader = BundleLoader::new(resolver, inspector, true);
        let blueprints = loader.load_gadgets(&[plugin], None).unwrap();

        let sandbox = json!({ "plugins": { "mailSender": { "host": "smtp" } } });
        let logging = LoggingFactory::new("demo");
        let injector = Injector::new();
        let args = InstantiateArgs {
            sandbox_config: &sandbox,
            profile_config: &Value::Null,
            logging: &logging,
            injector: &injector,
        };
        let built = blueprints["devebot-plugin-mail-sender/sender"]
            .instantiate(&args)
            .unwrap()
            .downcast::<(Value, String)>()
            .unwrap();
        assert_eq!(built.0, json!({ "host": "smtp" }));
        assert_eq!(built.1, "demo/mailSender/sender");
    }

    #[test]
    fn sector_is_shared_without_gadget_logging() {
        let (resolver, inspector, plugin, _) = setup();
        let loader = BundleLoader::new(resolver, inspector, false);
        let blueprints = loader.load_gadgets(&[plugin], Some("^send")).unwrap();
        assert_eq!(blueprints.len(), 1);

        let logging = LoggingFactory::new("demo");
        let injector = Injector::new();
        let args = InstantiateArgs {
            sandbox_config: &json!({}),
            profile_config: &Value::Null,
            logging: &logging,
            injector: &injector,
        };
        let built = blueprints["devebot-plugin-mail-sender/sender"]
            .instantiate(&args)
            .unwrap()
            .downcast::<(Value, String)>()
            .unwrap();
        assert_eq!(built.0, json!({}));
        assert_eq!(built.1, "demo");
    }

    #[test]
    fn failing_gadget_is_collected_by_kind() {
        let (resolver, inspector, plugin, _) = setup();
        let loader = BundleLoader::new(resolver, Arc::clone(&inspector), true);
        let blueprints = loader.load_gadgets(&[plugin], None).unwrap();

        let logging = LoggingFactory::new("demo");
        let injector = Injector::new();
        let args = InstantiateArgs {
            sandbox_config: &json!({}),
            profile_config: &Value::Null,
            logging: &logging,
            injector: &injector,
        };
        assert!(blueprints["devebot-plugin-mail-sender/purge"].instantiate(&args).is_none());

        let errors = inspector.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::Routine);
        assert_eq!(errors[0].name, "devebot-plugin-mail-sender/purge");
    }

    #[test]
    fn invalid_filter_is_rejected() {
        let (resolver, inspector, plugin, _) = setup();
        let loader = BundleLoader::new(resolver, inspector, true);
        let err = loader.load_gadgets(&[plugin], Some("(")).unwrap_err();
        assert!(matches!(err, KernelError::InvalidFilter { .. }));
    }
}
