//! Manifest-driven validation of the merged sandbox configuration.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use devebot_config::{Configuration, SchemaValidator, pick};
use devebot_naming::NameResolver;
use devebot_primitives::{
    IssueInspector, IssueKind, IssueRecord, Manifest, ModuleKind, ModuleRef, Stage,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::DialectBlueprint;

/// File holding a module's manifest, relative to its root.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Manifest section describing the sandbox tier.
pub const SANDBOX_ROOT_KEY: &str = "sandbox";

/// Checks configuration slices against module manifests.
pub struct ManifestValidator {
    resolver: Arc<NameResolver>,
    inspector: Arc<IssueInspector>,
    validator: Arc<dyn SchemaValidator>,
}

impl std::fmt::Debug for ManifestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestValidator").finish_non_exhaustive()
    }
}

struct Subject<'a> {
    kind: IssueKind,
    name: &'a str,
    slice: &'a Value,
    manifest: Manifest,
}

impl ManifestValidator {
    /// Creates a validator reporting to `inspector`.
    #[must_use]
    pub fn new(
        resolver: Arc<NameResolver>,
        inspector: Arc<IssueInspector>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            resolver,
            inspector,
            validator,
        }
    }

    /// Validates plugin, application, and dialect slices of the sandbox
    /// mixture, then runs the constraint checkers.
    ///
    /// Returns the number of failures collected.
    pub fn validate(
        &self,
        config: &Configuration,
        dialects: &BTreeMap<String, DialectBlueprint>,
    ) -> usize {
        let before = self.inspector.errors().len();
        let sandbox = &config.sandbox.mixture;
        let empty = Value::Object(Map::new());
        let mut subjects = Vec::new();

        for plugin in &config.plugin_refs {
            if let Some(manifest) = self.manifest_of(plugin) {
                let alias = self
                    .resolver
                    .default_alias_of(plugin.name(), ModuleKind::Plugin);
                subjects.push(Subject {
                    kind: IssueKind::Module(ModuleKind::Plugin),
                    name: plugin.name(),
                    slice: pick(sandbox, &["plugins", alias.as_str()]).unwrap_or(&empty),
                    manifest,
                });
            }
        }

        if let Some(app) = &config.app_ref {
            if let Some(manifest) = self.manifest_of(app) {
                subjects.push(Subject {
                    kind: IssueKind::Module(ModuleKind::Application),
                    name: app.name(),
                    slice: pick(sandbox, &["application"]).unwrap_or(&empty),
                    manifest,
                });
            }
        }

        let bridge_manifests: BTreeMap<&str, Manifest> = config
            .bridge_refs
            .iter()
            .filter_map(|bridge| Some((bridge.name(), self.manifest_of(bridge)?)))
            .collect();
        for dialect in dialects.values() {
            if let Some(manifest) = bridge_manifests.get(dialect.bridge()) {
                subjects.push(Subject {
                    kind: IssueKind::Dialect,
                    name: dialect.name(),
                    slice: pick(sandbox, dialect.config_path()).unwrap_or(&empty),
                    manifest: manifest.clone(),
                });
            }
        }

        for subject in &subjects {
            self.check_schema(subject);
        }
        for subject in &subjects {
            self.check_constraints(subject, sandbox);
        }

        let failures = self.inspector.errors().len() - before;
        debug!(subjects = subjects.len(), failures, "manifest validation finished");
        failures
    }

    fn check_schema(&self, subject: &Subject<'_>) {
        let Some(schema) = subject.manifest.schema() else {
            return;
        };
        let result = self.validator.validate(subject.slice, schema);
        if !result.valid {
            warn!(module = subject.name, errors = ?result.errors, "configuration rejected by schema");
            self.inspector.collect(
                IssueRecord::error(Stage::ConfigSchema, subject.kind, subject.name)
                    .with_stack(result.errors.join("\n")),
            );
        }
    }

    fn check_constraints(&self, subject: &Subject<'_>, sandbox: &Value) {
        let Some(check) = subject.manifest.check_constraints() else {
            return;
        };
        let stack = match check(subject.slice, sandbox) {
            Ok(true) => return,
            Ok(false) => "constraints not satisfied".to_owned(),
            Err(err) => format!("{err:?}"),
        };
        warn!(module = subject.name, reason = %stack, "configuration rejected by constraints");
        self.inspector.collect(
            IssueRecord::error(Stage::ConfigConstraints, subject.kind, subject.name)
                .with_stack(stack),
        );
    }

    /// Manifest attached to `module`, or read from its `manifest.json`.
    fn manifest_of(&self, module: &ModuleRef) -> Option<Manifest> {
        if let Some(manifest) = module.manifest() {
            return Some(manifest.clone());
        }
        let file = module.path().join(MANIFEST_FILE);
        match read_manifest(&file) {
            Ok(manifest) => manifest,
            Err(reason) => {
                warn!(module = module.name(), file = %file.display(), %reason, "manifest rejected");
                self.inspector.collect(
                    IssueRecord::error(Stage::Config, IssueKind::Module(module.kind()), module.name())
                        .with_stack(reason)
                        .with_path(file),
                );
                None
            }
        }
    }
}

fn read_manifest(file: &Path) -> Result<Option<Manifest>, String> {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.to_string()),
    };
    let document: Value = serde_json::from_str(&text).map_err(|err| err.to_string())?;
    Manifest::from_document(&document, SANDBOX_ROOT_KEY).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use devebot_config::{ConfigTier, JsonSchemaValidator};
    use devebot_primitives::{RecordingExit, UpgradeMode};
    use serde_json::json;

    use super::*;
    use crate::{BridgeLoader, BridgeModule, DialectContext, LegacyShape, instance};

    fn configuration(sandbox: Value, plugins: Vec<ModuleRef>, app: Option<ModuleRef>) -> Configuration {
        Configuration {
            profile: ConfigTier::default(),
            sandbox: ConfigTier {
                mixture: sandbox,
                ..ConfigTier::default()
            },
            texture: ConfigTier::default(),
            app_ref: app,
            framework_ref: None,
            plugin_refs: plugins,
            bridge_refs: Vec::new(),
            failures: 0,
        }
    }

    fn validator(plugins: &[ModuleRef]) -> (ManifestValidator, Arc<IssueInspector>) {
        let inspector = Arc::new(IssueInspector::new(Arc::new(RecordingExit::new())));
        let resolver =
            Arc::new(NameResolver::new(plugins.to_vec(), Vec::new(), &inspector).unwrap());
        let validator = ManifestValidator::new(
            resolver,
            Arc::clone(&inspector),
            Arc::new(JsonSchemaValidator),
        );
        (validator, inspector)
    }

    fn host_schema() -> Manifest {
        Manifest::builder()
            .schema(json!({
                "type": "object",
                "properties": { "host": { "type": "string" } },
                "required": ["host"]
            }))
            .unwrap()
            .build()
    }

    #[test]
    fn plugin_slice_is_checked_against_schema() {
        let plugin = ModuleRef::plugin("devebot-plugin-mail", "/opt/mail")
            .unwrap()
            .with_manifest(host_schema());
        let (validator, inspector) = validator(std::slice::from_ref(&plugin));

        let ok = configuration(json!({ "plugins": { "mail": { "host": "smtp" } } }), vec![plugin.clone()], None);
        assert_eq!(validator.validate(&ok, &BTreeMap::new()), 0);

        let bad = configuration(json!({ "plugins": { "mail": { "host": 25 } } }), vec![plugin], None);
        assert_eq!(validator.validate(&bad, &BTreeMap::new()), 1);
        let errors = inspector.errors();
        assert_eq!(errors[0].stage, Stage::ConfigSchema);
        assert_eq!(errors[0].name, "devebot-plugin-mail");
    }

    #[test]
    fn constraints_see_the_whole_sandbox() {
        let manifest = Manifest::builder()
            .check_constraints(|own, sandbox| {
                Ok(own["port"] != sandbox["application"]["port"])
            })
            .build();
        let plugin = ModuleRef::plugin("devebot-plugin-mail", "/opt/mail")
            .unwrap()
            .with_manifest(manifest);
        let (validator, inspector) = validator(std::slice::from_ref(&plugin));

        let clash = configuration(
            json!({ "plugins": { "mail": { "port": 80 } }, "application": { "port": 80 } }),
            vec![plugin],
            None,
        );
        assert_eq!(validator.validate(&clash, &BTreeMap::new()), 1);
        assert_eq!(inspector.errors()[0].stage, Stage::ConfigConstraints);
    }

    #[test]
    fn failing_checker_is_one_record() {
        let manifest = Manifest::builder()
            .check_constraints(|_, _| anyhow::bail!("checker exploded"))
            .build();
        let app = ModuleRef::new("demo-app", "/srv/demo", ModuleKind::Application)
            .unwrap()
            .with_manifest(manifest);
        let (validator, inspector) = validator(&[]);

        let config = configuration(json!({}), Vec::new(), Some(app));
        assert_eq!(validator.validate(&config, &BTreeMap::new()), 1);
        let errors = inspector.errors();
        assert_eq!(errors[0].kind, IssueKind::Module(ModuleKind::Application));
        assert!(errors[0].stack.as_deref().unwrap().contains("checker exploded"));
    }

    #[test]
    fn manifest_file_is_used_as_fallback() {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join(MANIFEST_FILE),
            json!({
                "sandbox": {
                    "validation": {
                        "schema": { "type": "object", "required": ["secret"] }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();
        let app = ModuleRef::new("demo-app", root.path(), ModuleKind::Application).unwrap();
        let (validator, inspector) = validator(&[]);

        let config = configuration(json!({ "application": {} }), Vec::new(), Some(app));
        assert_eq!(validator.validate(&config, &BTreeMap::new()), 1);
        assert_eq!(inspector.errors()[0].stage, Stage::ConfigSchema);
    }

    #[test]
    fn broken_manifest_file_is_a_config_record() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join(MANIFEST_FILE), "{ broken").unwrap();
        let app = ModuleRef::new("demo-app", root.path(), ModuleKind::Application).unwrap();
        let (validator, inspector) = validator(&[]);

        let config = configuration(json!({}), Vec::new(), Some(app));
        assert_eq!(validator.validate(&config, &BTreeMap::new()), 1);
        let errors = inspector.errors();
        assert_eq!(errors[0].stage, Stage::Config);
        assert_eq!(errors[0].path.as_deref(), Some(root.path().join(MANIFEST_FILE).as_path()));
    }

    #[test]
    fn dialect_slices_use_the_bridge_schema() {
        let bridge = ModuleRef::bridge("devebot-co-http", "/opt/http")
            .unwrap()
            .with_manifest(
                Manifest::builder()
                    .schema(json!({ "type": "object", "required": ["url"] }))
                    .unwrap()
                    .build(),
            );
        let inspector = Arc::new(IssueInspector::new(Arc::new(RecordingExit::new())));
        let resolver = Arc::new(
            NameResolver::new(Vec::new(), vec![bridge.clone()], &inspector).unwrap(),
        );
        let sandbox = json!({
            "bridges": {
                "http": {
                    "application": { "c1": { "nope": 1 }, "c2": { "url": "x" } }
                }
            }
        });
        let dialects = BridgeLoader::new(
            Arc::clone(&resolver),
            &[BridgeModule::from_fn(bridge.clone(), |_: &DialectContext| {
                Ok(instance(()))
            })],
            Arc::clone(&inspector),
            UpgradeMode::modern(),
        )
        .load_dialects(&sandbox["bridges"], LegacyShape::default());
        assert_eq!(dialects.len(), 2);

        let mut config = configuration(sandbox, Vec::new(), None);
        config.bridge_refs = vec![bridge];
        let validator =
            ManifestValidator::new(resolver, Arc::clone(&inspector), Arc::new(JsonSchemaValidator));
        assert_eq!(validator.validate(&config, &dialects), 1);

        let errors = inspector.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, Stage::ConfigSchema);
        assert_eq!(errors[0].kind, IssueKind::Dialect);
        assert_eq!(errors[0].name, "application/devebot-co-http/c1");
    }

    #[test]
    fn modules_without_manifest_pass() {
        let root = tempfile::tempdir().unwrap();
        let app = ModuleRef::new("demo-app", root.path(), ModuleKind::Application).unwrap();
        let (validator, inspector) = validator(&[]);
        let config = configuration(json!({ "application": { "x": 1 } }), Vec::new(), Some(app));
        assert_eq!(validator.validate(&config, &BTreeMap::new()), 0);
        assert!(inspector.records().is_empty());
    }
}
