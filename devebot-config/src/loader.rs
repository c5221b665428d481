//! Tiered configuration loader.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use devebot_naming::NameResolver;
use devebot_primitives::{
    BarrierOptions, EnvBox, FRAMEWORK_NAME, IssueInspector, IssueKind, IssueRecord, ModuleKind,
    ModuleRef, Stage, UpgradeMode,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::merge::defaults_deep;
use crate::scanner::filter_files;
use crate::shaping::{ConfigShaper, ModuleScope, shaper_for};
use crate::tier::{ConfigTier, Tier, TierAliases};
use crate::{ConfigError, ConfigResult};

const CONFIG_SUBDIR: &str = "config";
const CONFIG_EXT: &str = "json";

/// Caller-supplied loading options.
///
/// Explicit selections replace the corresponding environment variables.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Application name; drives the environment prefix.
    pub app_name: String,
    /// Selected profile variants.
    pub profile: Option<Vec<String>>,
    /// Selected sandbox variants.
    pub sandbox: Option<Vec<String>>,
    /// Selected texture variants.
    pub texture: Option<Vec<String>>,
    /// Profile variants always applied last.
    pub private_profile: Vec<String>,
    /// Sandbox variants always applied last.
    pub private_sandbox: Vec<String>,
    /// Texture variants always applied last.
    pub private_texture: Vec<String>,
    /// External config directory.
    pub config_dir: Option<PathBuf>,
    /// Sub-directory of the external config directory.
    pub config_env: Option<String>,
    /// `Some(false)` keeps the process alive when the barrier fails.
    pub exit_on_error: Option<bool>,
}

impl LoaderOptions {
    /// Creates options for `app_name` with nothing selected.
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    fn selected(&self, tier: Tier) -> Option<&Vec<String>> {
        match tier {
            Tier::Profile => self.profile.as_ref(),
            Tier::Sandbox => self.sandbox.as_ref(),
            Tier::Texture => self.texture.as_ref(),
        }
    }

    fn private(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Profile => &self.private_profile,
            Tier::Sandbox => &self.private_sandbox,
            Tier::Texture => &self.private_texture,
        }
    }
}

/// Merged configuration of one bootstrap run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Runtime behavior tier.
    pub profile: ConfigTier,
    /// Business settings tier.
    pub sandbox: ConfigTier,
    /// Interception rules tier.
    pub texture: ConfigTier,
    /// The application, when it has a root directory.
    pub app_ref: Option<ModuleRef>,
    /// The framework.
    pub framework_ref: Option<ModuleRef>,
    /// Plugins in dependency order.
    pub plugin_refs: Vec<ModuleRef>,
    /// Bridges in dependency order.
    pub bridge_refs: Vec<ModuleRef>,
    /// Failures collected during the load; non-zero only when the barrier was silenced.
    #[serde(skip)]
    pub failures: usize,
}

impl Configuration {
    /// Returns the slots of `tier`.
    #[must_use]
    pub fn tier(&self, tier: Tier) -> &ConfigTier {
        match tier {
            Tier::Profile => &self.profile,
            Tier::Sandbox => &self.sandbox,
            Tier::Texture => &self.texture,
        }
    }
}

enum Loaded {
    Document(Value),
    Missing,
    Failed,
}

/// Composes the three configuration tiers.
///
/// Constructed per bootstrap run; [`load`](Self::load) builds fresh tiers on every call.
pub struct ConfigLoader {
    options: LoaderOptions,
    app: Option<ModuleRef>,
    resolver: Arc<NameResolver>,
    inspector: Arc<IssueInspector>,
    envbox: EnvBox,
    aliases: TierAliases,
    mode: UpgradeMode,
    shaper: Box<dyn ConfigShaper>,
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("options", &self.options)
            .field("app", &self.app.as_ref().map(ModuleRef::name))
            .field("aliases", &self.aliases)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ConfigLoader {
    /// Creates a loader.
    ///
    /// Plugins, bridges, and the framework are taken from `resolver`; `app` is
    /// the application reference whose root holds the `config` directory.
    #[must_use]
    pub fn new(
        options: LoaderOptions,
        app: Option<ModuleRef>,
        resolver: Arc<NameResolver>,
        inspector: Arc<IssueInspector>,
        envbox: EnvBox,
        mode: UpgradeMode,
    ) -> Self {
        let aliases = TierAliases::from_env(&envbox);
        let shaper = shaper_for(mode, Arc::clone(&resolver));
        Self {
            options,
            app,
            resolver,
            inspector,
            envbox,
            aliases,
            mode,
            shaper,
        }
    }

    /// Replaces the recognized tier aliases.
    #[must_use]
    pub fn with_aliases(mut self, aliases: TierAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Loads and merges every tier.
    ///
    /// Per tier, in increasing precedence: the framework default, then plugin
    /// and bridge defaults (earlier modules win), the application default, and
    /// the selected variants in selection order. The same application steps
    /// are repeated for an external config directory. Per-file failures are
    /// collected, and a barrier runs before the result is returned. A silenced
    /// barrier lets the partial configuration through with
    /// [`Configuration::failures`] set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Barrier`] when failures were collected, an exit
    /// was requested, and the exit hook returned. Scan or pattern errors are
    /// returned for unreadable config directories.
    pub fn load(&self) -> ConfigResult<Configuration> {
        let default_dir = self.app.as_ref().map(|app| app.path().join(CONFIG_SUBDIR));
        let external_dir = self.resolve_external_dir(default_dir.as_deref());

        let mut tiers = BTreeMap::new();
        for tier in Tier::ALL {
            let included = self.included_names(tier);
            debug!(%tier, ?included, "loading tier");

            let mut store = ConfigTier::default();
            self.load_module_defaults(tier, &mut store);

            if let Some(dir) = &default_dir {
                self.load_application_dir(tier, dir, &included, &mut store)?;
            }
            if let Some(dir) = &external_dir {
                if Some(dir) != default_dir.as_ref() {
                    self.load_application_dir(tier, dir, &included, &mut store)?;
                }
            }
            store.refresh_mixture();

            let store = ConfigTier {
                default: self.shaper.on_finish(tier, store.default),
                expanse: self.shaper.on_finish(tier, store.expanse),
                mixture: self.shaper.on_finish(tier, store.mixture),
                names: store.names,
            };
            info!(%tier, names = ?store.names, "tier loaded");
            tiers.insert(tier, store);
        }

        let mut barrier = BarrierOptions::new("config-loader", "load");
        barrier.exit_on_error = self.options.exit_on_error;
        let outcome = self.inspector.barrier(barrier);
        if outcome.exit_requested {
            return Err(ConfigError::Barrier {
                errors: outcome.error_count,
            });
        }

        let mut take = |tier| tiers.remove(&tier).unwrap_or_default();
        Ok(Configuration {
            profile: take(Tier::Profile),
            sandbox: take(Tier::Sandbox),
            texture: take(Tier::Texture),
            app_ref: self.app.clone(),
            framework_ref: self.modules_of(ModuleKind::Framework).next().cloned(),
            plugin_refs: self.modules_of(ModuleKind::Plugin).cloned().collect(),
            bridge_refs: self.resolver.bridge_refs().to_vec(),
            failures: outcome.error_count,
        })
    }

    /// Variant names applied to `tier`, lowest precedence first.
    ///
    /// Private names are moved to the end, in their own order.
    #[must_use]
    pub fn included_names(&self, tier: Tier) -> Vec<String> {
        let selected = match self.options.selected(tier) {
            Some(names) => names.clone(),
            None => self.envbox.list(tier.env_var()),
        };
        let private = self.options.private(tier);
        selected
            .into_iter()
            .filter(|name| !private.contains(name))
            .chain(private.iter().cloned())
            .collect()
    }

    /// Directory layered over the in-package `config` directory, if any.
    ///
    /// An explicit or `CONFIG_DIR` directory wins; in production the
    /// `~/.devebot/{app}` directory is used when it exists. `CONFIG_ENV`
    /// selects a sub-directory.
    #[must_use]
    pub fn resolve_external_dir(&self, default_dir: Option<&Path>) -> Option<PathBuf> {
        let explicit = self
            .options
            .config_dir
            .clone()
            .or_else(|| self.envbox.get("CONFIG_DIR").map(PathBuf::from));

        let base = explicit.or_else(|| {
            let production = self.envbox.raw("NODE_ENV").as_deref() == Some("production");
            if production {
                dirs::home_dir()
                    .map(|home| home.join(format!(".{FRAMEWORK_NAME}")).join(&self.options.app_name))
                    .filter(|dir| dir.is_dir())
            } else {
                default_dir.map(Path::to_path_buf)
            }
        })?;

        let config_env = self
            .options
            .config_env
            .clone()
            .or_else(|| self.envbox.get("CONFIG_ENV"));
        Some(match config_env {
            Some(env) => base.join(env),
            None => base,
        })
    }

    fn modules_of(&self, kind: ModuleKind) -> impl Iterator<Item = &ModuleRef> {
        self.resolver
            .plugin_refs()
            .iter()
            .filter(move |module| module.kind() == kind)
    }

    fn load_module_defaults(&self, tier: Tier, store: &mut ConfigTier) {
        let modules = self
            .modules_of(ModuleKind::Plugin)
            .chain(self.resolver.bridge_refs())
            .chain(self.modules_of(ModuleKind::Framework));

        for module in modules {
            let dir = module.config_dir(self.mode.presets);
            let scope = ModuleScope {
                kind: module.kind(),
                name: module.name(),
                presets: module.presets(),
            };
            if let Some(document) = self.load_first(&dir, tier) {
                let document = self.shaper.on_load(tier, document, &scope);
                defaults_deep(&mut store.default, &document);
            }
        }
    }

    /// Applies one application config directory.
    ///
    /// `expanse` restarts from the directory's default file, while `mixture`
    /// keeps what earlier directories contributed. A variant already applied
    /// from an earlier directory is merged again but listed once in `names`.
    fn load_application_dir(
        &self,
        tier: Tier,
        dir: &Path,
        included: &[String],
        store: &mut ConfigTier,
    ) -> ConfigResult<()> {
        let presets = self
            .app
            .as_ref()
            .map(|app| app.presets().clone())
            .unwrap_or_default();
        let scope = ModuleScope {
            kind: ModuleKind::Application,
            name: ModuleKind::Application.as_str(),
            presets: &presets,
        };

        store.expanse = Value::Object(Map::new());
        if let Some(document) = self.load_first(dir, tier) {
            let document = self.shaper.on_load(tier, document, &scope);
            store.expanse = document.clone();

            let mut default = document;
            defaults_deep(&mut default, &store.default);
            store.default = default;
        }

        for (stem, variant) in self.select_variants(tier, dir, included)? {
            let file = dir.join(format!("{stem}_{variant}.{CONFIG_EXT}"));
            let Loaded::Document(document) = self.load_file(&file) else {
                continue;
            };
            if document.get("disabled") == Some(&Value::Bool(true)) {
                debug!(%tier, file = %file.display(), "variant disabled; skipped");
                continue;
            }
            let document = self.shaper.on_load(tier, document, &scope);
            let mut expanse = document;
            defaults_deep(&mut expanse, &store.expanse);
            store.expanse = expanse;
            if !store.names.contains(&variant) {
                store.names.push(variant);
            }
        }

        store.refresh_mixture();
        Ok(())
    }

    /// Lists `{stem}_{variant}` files of `tier` whose variant is included,
    /// ordered by inclusion order.
    fn select_variants(
        &self,
        tier: Tier,
        dir: &Path,
        included: &[String],
    ) -> ConfigResult<Vec<(String, String)>> {
        let stems = self.aliases.of(tier);
        let pattern = format!(r"^[^_]+_.+\.{CONFIG_EXT}$");
        let mut selected: Vec<(usize, String, String)> = filter_files(dir, &pattern)?
            .into_iter()
            .filter_map(|file| {
                let base = file.strip_suffix(&format!(".{CONFIG_EXT}"))?.to_owned();
                let (stem, variant) = base.split_once('_')?;
                if !stems.iter().any(|s| s == stem) {
                    return None;
                }
                let rank = included.iter().position(|name| name == variant)?;
                Some((rank, stem.to_owned(), variant.to_owned()))
            })
            .collect();
        selected.sort_by_key(|(rank, _, _)| *rank);
        Ok(selected
            .into_iter()
            .map(|(_, stem, variant)| (stem, variant))
            .collect())
    }

    /// Loads `{dir}/{alias}.json` for the first alias of `tier` that exists.
    fn load_first(&self, dir: &Path, tier: Tier) -> Option<Value> {
        for stem in self.aliases.of(tier) {
            let file = dir.join(format!("{stem}.{CONFIG_EXT}"));
            match self.load_file(&file) {
                Loaded::Document(document) => return Some(document),
                Loaded::Failed => return None,
                Loaded::Missing => {}
            }
        }
        None
    }

    fn load_file(&self, file: &Path) -> Loaded {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Loaded::Missing,
            Err(err) => {
                self.report_failure(file, &err.to_string());
                return Loaded::Failed;
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(document @ Value::Object(_)) => {
                debug!(file = %file.display(), "config file loaded");
                Loaded::Document(document)
            }
            Ok(_) => {
                self.report_failure(file, "config document must be a JSON object");
                Loaded::Failed
            }
            Err(err) => {
                self.report_failure(file, &err.to_string());
                Loaded::Failed
            }
        }
    }

    fn report_failure(&self, file: &Path, reason: &str) {
        warn!(file = %file.display(), reason, "config file rejected");
        let name = file
            .file_name()
            .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.inspector.collect(
            IssueRecord::error(Stage::Config, IssueKind::Config, name)
                .with_stack(reason)
                .with_path(file),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use devebot_primitives::{FRAMEWORK_PACKAGE, MapEnv, RecordingExit};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        root: TempDir,
        inspector: Arc<IssueInspector>,
        exit: Arc<RecordingExit>,
    }

    impl Fixture {
        fn new() -> Self {
            let exit = Arc::new(RecordingExit::new());
            Self {
                root: tempfile::tempdir().unwrap(),
                inspector: Arc::new(IssueInspector::new(exit.clone())),
                exit,
            }
        }

        fn dir(&self, relative: &str) -> PathBuf {
            let dir = self.root.path().join(relative);
            fs::create_dir_all(&dir).unwrap();
            dir
        }

        fn write(&self, relative: &str, content: &str) {
            let path = self.root.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn write_json(&self, relative: &str, value: &Value) {
            self.write(relative, &value.to_string());
        }

        fn loader(&self, options: LoaderOptions, env: MapEnv, mode: UpgradeMode) -> ConfigLoader {
            self.loader_with(options, env, mode, Vec::new(), Vec::new())
        }

        fn loader_with(
            &self,
            options: LoaderOptions,
            env: MapEnv,
            mode: UpgradeMode,
            plugins: Vec<ModuleRef>,
            bridges: Vec<ModuleRef>,
        ) -> ConfigLoader {
            let app = ModuleRef::new("demo-app", self.dir("app"), ModuleKind::Application).unwrap();
            let resolver =
                Arc::new(NameResolver::new(plugins, bridges, &self.inspector).unwrap());
            ConfigLoader::new(
                options,
                Some(app),
                resolver,
                Arc::clone(&self.inspector),
                EnvBox::new(Arc::new(env), "demo-app"),
                mode,
            )
        }
    }

    fn silent(app_name: &str) -> LoaderOptions {
        LoaderOptions {
            exit_on_error: Some(false),
            ..LoaderOptions::new(app_name)
        }
    }

    #[test]
    fn variant_overrides_default() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox.json", &json!({ "host": "a", "port": 1 }));
        fx.write_json("app/config/sandbox_dev.json", &json!({ "port": 2 }));

        let options = LoaderOptions {
            sandbox: Some(vec!["dev".into()]),
            ..silent("demo-app")
        };
        let config = fx.loader(options, MapEnv::new(), UpgradeMode::modern()).load().unwrap();

        assert_eq!(config.sandbox.mixture, json!({ "host": "a", "port": 2 }));
        assert_eq!(config.sandbox.names, ["default", "dev"]);
        assert_eq!(config.sandbox.expanse, json!({ "host": "a", "port": 2 }));
    }

    #[test]
    fn variants_selected_from_environment() {
        let fx = Fixture::new();
        fx.write_json("app/config/profile.json", &json!({ "level": "info" }));
        fx.write_json("app/config/profile_debug.json", &json!({ "level": "debug" }));
        fx.write_json("app/config/profile_other.json", &json!({ "level": "trace" }));

        let env = MapEnv::new().with("DEMO_APP_PROFILE", "debug");
        let config = fx.loader(silent("demo-app"), env, UpgradeMode::modern()).load().unwrap();
        assert_eq!(config.profile.mixture, json!({ "level": "debug" }));
        assert_eq!(config.profile.names, ["default", "debug"]);
    }

    #[test]
    fn disabled_variant_contributes_nothing() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox.json", &json!({ "host": "a" }));
        fx.write_json(
            "app/config/sandbox_off.json",
            &json!({ "disabled": true, "host": "b", "extra": 1 }),
        );

        let options = LoaderOptions {
            sandbox: Some(vec!["off".into()]),
            ..silent("demo-app")
        };
        let config = fx.loader(options, MapEnv::new(), UpgradeMode::modern()).load().unwrap();
        assert_eq!(config.sandbox.names, ["default"]);
        assert_eq!(config.sandbox.expanse, json!({ "host": "a" }));
    }

    #[test]
    fn later_included_variants_win() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox_a.json", &json!({ "x": "a", "only_a": 1 }));
        fx.write_json("app/config/sandbox_b.json", &json!({ "x": "b" }));

        let options = LoaderOptions {
            sandbox: Some(vec!["b".into(), "a".into()]),
            ..silent("demo-app")
        };
        let config = fx.loader(options, MapEnv::new(), UpgradeMode::modern()).load().unwrap();
        assert_eq!(config.sandbox.names, ["default", "b", "a"]);
        assert_eq!(config.sandbox.mixture, json!({ "x": "a", "only_a": 1 }));
    }

    #[test]
    fn private_names_are_applied_last() {
        let fx = Fixture::new();
        let options = LoaderOptions {
            sandbox: Some(vec!["mine".into(), "dev".into(), "qa".into()]),
            private_sandbox: vec!["mine".into(), "secret".into()],
            ..silent("demo-app")
        };
        let loader = fx.loader(options, MapEnv::new(), UpgradeMode::modern());
        assert_eq!(loader.included_names(Tier::Sandbox), ["dev", "qa", "mine", "secret"]);
        assert!(loader.included_names(Tier::Texture).is_empty());
    }

    #[test]
    fn variant_name_keeps_inner_underscores() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox_prod_eu.json", &json!({ "region": "eu" }));

        let options = LoaderOptions {
            sandbox: Some(vec!["prod_eu".into()]),
            ..silent("demo-app")
        };
        let config = fx.loader(options, MapEnv::new(), UpgradeMode::modern()).load().unwrap();
        assert_eq!(config.sandbox.names, ["default", "prod_eu"]);
        assert_eq!(config.sandbox.mixture, json!({ "region": "eu" }));
    }

    #[test]
    fn module_defaults_rank_below_application() {
        let fx = Fixture::new();
        fx.write_json(
            "plugins/foo/config/sandbox.json",
            &json!({ "plugins": { "foo": { "a": "plugin", "b": "plugin" } }, "shared": "foo" }),
        );
        fx.write_json(
            "framework/config/sandbox.json",
            &json!({ "shared": "framework", "core": true }),
        );
        fx.write_json(
            "app/config/sandbox.json",
            &json!({ "plugins": { "devebot-plugin-foo": { "a": "app" } } }),
        );

        let plugins = vec![
            ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo")).unwrap(),
            ModuleRef::new(FRAMEWORK_PACKAGE, fx.dir("framework"), ModuleKind::Framework).unwrap(),
        ];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::modern(), plugins, Vec::new())
            .load()
            .unwrap();

        assert_eq!(
            config.sandbox.mixture,
            json!({
                "plugins": { "foo": { "a": "app", "b": "plugin" } },
                "shared": "foo",
                "core": true
            })
        );
        assert_eq!(config.plugin_refs.len(), 1);
        assert_eq!(config.framework_ref.as_ref().map(ModuleRef::name), Some(FRAMEWORK_PACKAGE));
    }

    #[test]
    fn first_alias_wins_for_module_defaults() {
        let fx = Fixture::new();
        fx.write_json("plugins/foo/config/context.json", &json!({ "from": "context" }));
        fx.write_json("plugins/foo/config/sandbox.json", &json!({ "from": "sandbox", "x": 1 }));

        let plugins = vec![ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo")).unwrap()];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::modern(), plugins, Vec::new())
            .load()
            .unwrap();
        assert_eq!(config.sandbox.default, json!({ "from": "context" }));
    }

    #[test]
    fn missing_files_are_not_errors() {
        let fx = Fixture::new();
        let plugins = vec![ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo")).unwrap()];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::modern(), plugins, Vec::new())
            .load()
            .unwrap();
        assert!(fx.inspector.records().is_empty());
        assert_eq!(config.profile.mixture, json!({}));
    }

    #[test]
    fn broken_file_is_collected_and_others_still_load() {
        let fx = Fixture::new();
        fx.write("plugins/bad/config/sandbox.json", "{ not json");
        fx.write_json("plugins/good/config/sandbox.json", &json!({ "good": true }));

        let plugins = vec![
            ModuleRef::plugin("devebot-plugin-bad", fx.dir("plugins/bad")).unwrap(),
            ModuleRef::plugin("devebot-plugin-good", fx.dir("plugins/good")).unwrap(),
        ];
        let loader = fx.loader_with(
            silent("demo-app"),
            MapEnv::new(),
            UpgradeMode::modern(),
            plugins,
            Vec::new(),
        );
        let config = loader.load().unwrap();
        assert_eq!(config.failures, 1);
        assert_eq!(config.sandbox.default, json!({ "good": true }));
        assert_eq!(config.sandbox.mixture, json!({ "good": true }));

        let errors = fx.inspector.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::Config);
        assert_eq!(errors[0].name, "sandbox.json");
        assert!(errors[0].path.as_ref().unwrap().starts_with(fx.root.path().join("plugins/bad")));
        assert!(fx.exit.codes().is_empty());
    }

    #[test]
    fn failing_barrier_requests_exit() {
        let fx = Fixture::new();
        fx.write("app/config/texture.json", "[1, 2]");

        let loader = fx.loader(LoaderOptions::new("demo-app"), MapEnv::new(), UpgradeMode::modern());
        let err = loader.load().unwrap_err();
        assert!(matches!(err, ConfigError::Barrier { errors: 1 }));
        assert_eq!(fx.exit.codes(), [1]);
    }

    #[test]
    fn external_directory_layers_on_top() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox.json", &json!({ "host": "a", "port": 1 }));
        fx.write_json("etc/staging/sandbox.json", &json!({ "port": 3 }));
        fx.write_json("etc/staging/sandbox_dev.json", &json!({ "debug": true }));

        let env = MapEnv::new()
            .with("DEMO_APP_CONFIG_DIR", fx.dir("etc").display().to_string())
            .with("DEMO_APP_CONFIG_ENV", "staging")
            .with("DEMO_APP_SANDBOX", "dev");
        let config = fx.loader(silent("demo-app"), env, UpgradeMode::modern()).load().unwrap();
        assert_eq!(
            config.sandbox.mixture,
            json!({ "host": "a", "port": 3, "debug": true })
        );
        assert_eq!(config.sandbox.expanse, json!({ "port": 3, "debug": true }));
        assert_eq!(config.sandbox.names, ["default", "dev"]);
    }

    #[test]
    fn variant_in_both_directories_is_listed_once() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox.json", &json!({ "a": 1 }));
        fx.write_json("app/config/sandbox_dev.json", &json!({ "b": 1 }));
        fx.write_json("etc/sandbox.json", &json!({ "c": 1 }));
        fx.write_json("etc/sandbox_dev.json", &json!({ "d": 1 }));

        let options = LoaderOptions {
            sandbox: Some(vec!["dev".into()]),
            config_dir: Some(fx.dir("etc")),
            ..silent("demo-app")
        };
        let config = fx.loader(options, MapEnv::new(), UpgradeMode::modern()).load().unwrap();
        assert_eq!(config.sandbox.names, ["default", "dev"]);
        assert_eq!(config.sandbox.expanse, json!({ "d": 1, "c": 1 }));
        assert_eq!(
            config.sandbox.mixture,
            json!({ "d": 1, "c": 1, "b": 1, "a": 1 })
        );
        assert_eq!(config.failures, 0);
    }

    #[test]
    fn config_env_alone_selects_a_subdirectory() {
        let fx = Fixture::new();
        let loader = fx.loader(
            LoaderOptions {
                config_env: Some("qa".into()),
                ..silent("demo-app")
            },
            MapEnv::new(),
            UpgradeMode::modern(),
        );
        let default_dir = fx.root.path().join("app/config");
        assert_eq!(
            loader.resolve_external_dir(Some(&default_dir)),
            Some(default_dir.join("qa"))
        );
    }

    #[test]
    fn sandbox_keys_end_as_default_aliases() {
        let fx = Fixture::new();
        fx.write_json(
            "plugins/foo/config/sandbox.json",
            &json!({ "plugins": { "devebot-plugin-foo": { "a": 1 } } }),
        );
        fx.write_json(
            "app/config/sandbox.json",
            &json!({
                "plugins": { "foo": { "b": 2 } },
                "bridges": { "http": { "foo": { "client1": { "url": "x" } } } }
            }),
        );

        let plugins = vec![ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo")).unwrap()];
        let bridges = vec![ModuleRef::bridge("devebot-co-http", fx.dir("bridges/http")).unwrap()];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::modern(), plugins, bridges)
            .load()
            .unwrap();
        assert_eq!(
            config.sandbox.mixture,
            json!({
                "plugins": { "foo": { "b": 2, "a": 1 } },
                "bridges": { "http": { "foo": { "client1": { "url": "x" } } } }
            })
        );
    }

    #[test]
    fn tagged_plugin_bridges_are_reshaped() {
        let fx = Fixture::new();
        fx.write_json(
            "plugins/foo/config/sandbox.json",
            &json!({ "bridges": { "client1": { "http": { "url": "x" } } } }),
        );
        let plugins = vec![
            ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo"))
                .unwrap()
                .with_presets(devebot_primitives::Presets {
                    config_dir: None,
                    config_tags: vec![crate::BRIDGE_DIALECT_TAG.to_owned()],
                }),
        ];
        let bridges = vec![ModuleRef::bridge("devebot-co-http", fx.dir("bridges/http")).unwrap()];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::modern(), plugins, bridges)
            .load()
            .unwrap();
        assert_eq!(
            config.sandbox.mixture,
            json!({ "bridges": { "http": { "foo": { "client1": { "url": "x" } } } } })
        );
    }

    #[test]
    fn verbatim_mode_keeps_written_keys() {
        let fx = Fixture::new();
        fx.write_json(
            "app/config/sandbox.json",
            &json!({ "plugins": { "devebot-plugin-foo": { "a": 1 } } }),
        );
        let plugins = vec![ModuleRef::plugin("devebot-plugin-foo", fx.dir("plugins/foo")).unwrap()];
        let config = fx
            .loader_with(silent("demo-app"), MapEnv::new(), UpgradeMode::legacy(), plugins, Vec::new())
            .load()
            .unwrap();
        assert_eq!(
            config.sandbox.mixture,
            json!({ "plugins": { "devebot-plugin-foo": { "a": 1 } } })
        );
    }

    #[test]
    fn each_load_starts_fresh() {
        let fx = Fixture::new();
        fx.write_json("app/config/sandbox.json", &json!({ "n": 1 }));
        let loader = fx.loader(silent("demo-app"), MapEnv::new(), UpgradeMode::modern());
        let first = loader.load().unwrap();
        fx.write_json("app/config/sandbox.json", &json!({ "m": 2 }));
        let second = loader.load().unwrap();
        assert_eq!(first.sandbox.mixture, json!({ "n": 1 }));
        assert_eq!(second.sandbox.mixture, json!({ "m": 2 }));
        assert_eq!(second.sandbox.names, ["default"]);
    }
}
