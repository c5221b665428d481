//! Bootstrap kernel for devebot applications.
//!
//! [`Kernel::assemble`] runs one bootstrap pass: it derives module aliases,
//! loads the configuration tiers, validates them against module manifests,
//! and builds every dialect and gadget into an [`Injector`]. Each stage
//! collects per-module failures and ends with a barrier.

#![warn(missing_docs, clippy::pedantic)]

mod bridge;
mod bundle;
mod error;
mod registry;
mod validation;

use std::fmt;
use std::sync::Arc;

use devebot_config::{ConfigLoader, Configuration, JsonSchemaValidator, LoaderOptions, SchemaValidator};
use devebot_naming::NameResolver;
use devebot_primitives::{
    BarrierOptions, EnvBox, EnvSource, FeatureGate, IssueInspector, ModuleRef, ProcessEnv,
    ProcessExit, StdExit, UpgradeMode,
};
use devebot_telemetry::LoggingFactory;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use bridge::{
    BridgeConstructor, BridgeLoader, BridgeModule, DialectAddressing, DialectBlueprint,
    DialectContext, DialectSite, FullRefAddressing, LegacyAddressing, LegacyShape, addressing_for,
};
pub use bundle::{
    Bundle, BundleLoader, GadgetBlueprint, GadgetConstructor, GadgetContext, GadgetDescriptor,
    GadgetKind,
};
pub use error::{KernelError, KernelResult};
pub use registry::{Injector, Instance, instance};
pub use validation::{MANIFEST_FILE, ManifestValidator, SANDBOX_ROOT_KEY};

/// Inputs shared by dialect and gadget construction.
#[derive(Debug, Clone, Copy)]
pub struct InstantiateArgs<'a> {
    /// Sandbox mixture.
    pub sandbox_config: &'a Value,
    /// Profile mixture.
    pub profile_config: &'a Value,
    /// Root logging factory.
    pub logging: &'a LoggingFactory,
    /// Components built so far.
    pub injector: &'a Injector,
}

/// Plugin module with the gadgets it contributes.
#[derive(Clone, Debug)]
pub struct PluginModule {
    /// Plugin reference.
    pub module: ModuleRef,
    /// Declared gadgets.
    pub gadgets: Vec<GadgetDescriptor>,
}

impl PluginModule {
    /// Creates a plugin with no gadgets.
    #[must_use]
    pub fn new(module: ModuleRef) -> Self {
        Self {
            module,
            gadgets: Vec::new(),
        }
    }

    /// Adds a gadget.
    #[must_use]
    pub fn with_gadget(mut self, gadget: GadgetDescriptor) -> Self {
        self.gadgets.push(gadget);
        self
    }
}

/// Everything one bootstrap run needs.
pub struct KernelParams {
    options: LoaderOptions,
    app: Option<ModuleRef>,
    app_gadgets: Vec<GadgetDescriptor>,
    framework: Option<ModuleRef>,
    plugins: Vec<PluginModule>,
    bridges: Vec<BridgeModule>,
    env: Arc<dyn EnvSource>,
    exit: Arc<dyn ProcessExit>,
    validator: Arc<dyn SchemaValidator>,
    gate: Option<FeatureGate>,
    legacy_shape: LegacyShape,
    gadget_filter: Option<String>,
    logging: Option<LoggingFactory>,
}

impl fmt::Debug for KernelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelParams")
            .field("options", &self.options)
            .field("app", &self.app.as_ref().map(ModuleRef::name))
            .field("plugins", &self.plugins.len())
            .field("bridges", &self.bridges.len())
            .field("gate", &self.gate)
            .field("legacy_shape", &self.legacy_shape)
            .finish_non_exhaustive()
    }
}

impl KernelParams {
    /// Creates parameters for `options.app_name` reading the process
    /// environment and exiting the process on barrier failures.
    #[must_use]
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            app: None,
            app_gadgets: Vec::new(),
            framework: None,
            plugins: Vec::new(),
            bridges: Vec::new(),
            env: Arc::new(ProcessEnv),
            exit: Arc::new(StdExit),
            validator: Arc::new(JsonSchemaValidator),
            gate: None,
            legacy_shape: LegacyShape::default(),
            gadget_filter: None,
            logging: None,
        }
    }

    /// Sets the application reference; its root holds the `config` directory.
    #[must_use]
    pub fn with_app(mut self, app: ModuleRef) -> Self {
        self.app = Some(app);
        self
    }

    /// Adds an application gadget.
    #[must_use]
    pub fn with_app_gadget(mut self, gadget: GadgetDescriptor) -> Self {
        self.app_gadgets.push(gadget);
        self
    }

    /// Sets the framework reference, whose defaults rank lowest.
    #[must_use]
    pub fn with_framework(mut self, framework: ModuleRef) -> Self {
        self.framework = Some(framework);
        self
    }

    /// Adds a plugin; plugins are given in dependency order.
    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginModule) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds a bridge.
    #[must_use]
    pub fn with_bridge(mut self, bridge: BridgeModule) -> Self {
        self.bridges.push(bridge);
        self
    }

    /// Replaces the environment source.
    #[must_use]
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// Replaces the process exit hook.
    #[must_use]
    pub fn with_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    /// Replaces the schema validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Uses `gate` instead of reading upgrade flags from the environment.
    #[must_use]
    pub fn with_feature_gate(mut self, gate: FeatureGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Selects the legacy `bridges` layout.
    #[must_use]
    pub fn with_legacy_shape(mut self, shape: LegacyShape) -> Self {
        self.legacy_shape = shape;
        self
    }

    /// Keeps only gadgets whose name matches `pattern`.
    #[must_use]
    pub fn with_gadget_filter(mut self, pattern: impl Into<String>) -> Self {
        self.gadget_filter = Some(pattern.into());
        self
    }

    /// Replaces the root logging factory.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingFactory) -> Self {
        self.logging = Some(logging);
        self
    }
}

/// Result of a successful bootstrap run.
pub struct Kernel {
    config: Configuration,
    injector: Injector,
    issues: Arc<IssueInspector>,
    resolver: Arc<NameResolver>,
    mode: UpgradeMode,
    logging: LoggingFactory,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("injector", &self.injector)
            .field("issues", &self.issues)
            .field("mode", &self.mode)
            .field("logging", &self.logging)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Runs the bootstrap pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] or [`KernelError::Barrier`] when a
    /// stage collected failures and the exit hook returned. With exits
    /// silenced, the run still stops at the end of the failing stage with
    /// [`KernelError::Barrier`]. A bad gadget filter gives
    /// [`KernelError::InvalidFilter`].
    pub fn assemble(params: KernelParams) -> KernelResult<Self> {
        let KernelParams {
            options,
            app,
            app_gadgets,
            framework,
            plugins,
            bridges,
            env,
            exit,
            validator,
            gate,
            legacy_shape,
            gadget_filter,
            logging,
        } = params;

        let envbox = EnvBox::new(env, &options.app_name);
        let gate = gate.unwrap_or_else(|| FeatureGate::from_env(&envbox));
        let mode = UpgradeMode::resolve(&gate);
        let logging = logging.unwrap_or_else(|| LoggingFactory::new(options.app_name.clone()));
        let exit_on_error = options.exit_on_error;
        info!(app = %options.app_name, ?mode, "bootstrap started");

        let issues = Arc::new(IssueInspector::new(exit));
        let plugin_refs = plugins
            .iter()
            .map(|plugin| plugin.module.clone())
            .chain(framework)
            .collect();
        let bridge_refs = bridges.iter().map(|bridge| bridge.module().clone()).collect();
        let resolver = Arc::new(NameResolver::new(plugin_refs, bridge_refs, &issues)?);

        let config = ConfigLoader::new(
            options,
            app.clone(),
            Arc::clone(&resolver),
            Arc::clone(&issues),
            envbox,
            mode,
        )
        .load()?;
        if config.failures > 0 {
            warn!(errors = config.failures, "configuration incomplete; bootstrap stopped");
            return Err(KernelError::Barrier {
                footmark: "config",
                errors: config.failures,
            });
        }

        let bridge_loader = BridgeLoader::new(Arc::clone(&resolver), &bridges, Arc::clone(&issues), mode);
        let empty = Value::Null;
        let dialect_options = config.sandbox.mixture.get("bridges").unwrap_or(&empty);
        let dialects = bridge_loader.load_dialects(dialect_options, legacy_shape);

        if mode.manifest_validation {
            ManifestValidator::new(Arc::clone(&resolver), Arc::clone(&issues), validator)
                .validate(&config, &dialects);
            barrier(&issues, "validate", exit_on_error)?;
        }

        let mut bundles: Vec<Bundle> = plugins
            .into_iter()
            .map(|plugin| {
                let module = resolver
                    .find(plugin.module.name(), plugin.module.kind())
                    .cloned()
                    .unwrap_or(plugin.module);
                Bundle::new(module, plugin.gadgets)
            })
            .collect();
        if let Some(app) = &app {
            bundles.push(Bundle::new(app.clone(), app_gadgets));
        }
        let gadgets = BundleLoader::new(Arc::clone(&resolver), Arc::clone(&issues), mode.gadget_logging)
            .load_gadgets(&bundles, gadget_filter.as_deref())?;

        let injector = Injector::new();
        let args = InstantiateArgs {
            sandbox_config: &config.sandbox.mixture,
            profile_config: &config.profile.mixture,
            logging: &logging,
            injector: &injector,
        };
        for (name, dialect) in &dialects {
            if let Some(built) = dialect.instantiate(&args) {
                injector.register(name.clone(), built)?;
            }
        }
        for kind in GadgetKind::ALL {
            for (name, gadget) in gadgets.iter().filter(|(_, g)| g.kind() == kind) {
                if let Some(built) = gadget.instantiate(&args) {
                    injector.register(name.clone(), built)?;
                }
            }
        }
        barrier(&issues, "instantiate", exit_on_error)?;

        info!(components = injector.len(), "bootstrap finished");
        Ok(Self {
            config,
            injector,
            issues,
            resolver,
            mode,
            logging,
        })
    }

    /// Returns the merged configuration.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Returns the component registry.
    #[must_use]
    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Returns the records collected during the run.
    #[must_use]
    pub fn issues(&self) -> &IssueInspector {
        &self.issues
    }

    /// Returns the name resolver.
    #[must_use]
    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    /// Returns the resolved upgrade mode.
    #[must_use]
    pub const fn mode(&self) -> UpgradeMode {
        self.mode
    }

    /// Returns the root logging factory.
    #[must_use]
    pub fn logging(&self) -> &LoggingFactory {
        &self.logging
    }

    /// Returns the component `name` if it has type `T`.
    #[must_use]
    pub fn lookup<T: std::any::Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.injector.lookup(name)
    }
}

fn barrier(
    issues: &IssueInspector,
    footmark: &'static str,
    exit_on_error: Option<bool>,
) -> KernelResult<()> {
    let mut options = BarrierOptions::new("kernel", footmark);
    options.exit_on_error = exit_on_error;
    let outcome = issues.barrier(options);
    if outcome.passed() {
        debug!(footmark, "barrier passed");
        Ok(())
    } else {
        Err(KernelError::Barrier {
            footmark,
            errors: outcome.error_count,
        })
    }
}
