//! Bidirectional alias lookup for plugins and bridges.

use std::collections::HashMap;
use std::sync::OnceLock;

use devebot_primitives::{
    FRAMEWORK_NAME, FRAMEWORK_PACKAGE, IssueInspector, IssueKind, IssueRecord, ModuleKind,
    ModuleRef, Stage,
};
use heck::ToLowerCamelCase;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::rules::{AliasMatch, NamingRules};

/// Errors raised while preparing the resolver.
#[derive(Debug, Error)]
pub enum NamingError {
    /// A naming rule failed to compile.
    #[error("invalid naming rule for {kind}: {source}")]
    InvalidRule {
        /// Module kind the rule belongs to.
        kind: ModuleKind,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Alias lookup tables for both module kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AliasTable {
    /// Plugin aliases.
    pub plugin: HashMap<String, String>,
    /// Bridge aliases.
    pub bridge: HashMap<String, String>,
}

impl AliasTable {
    fn of(&self, kind: ModuleKind) -> Option<&HashMap<String, String>> {
        match kind {
            ModuleKind::Plugin | ModuleKind::Framework => Some(&self.plugin),
            ModuleKind::Bridge => Some(&self.bridge),
            ModuleKind::Application => None,
        }
    }
}

/// Translates between distribution names and short codes.
///
/// Built once per bootstrap run. The absolute map sends every known spelling
/// (name, camel-cased name, code, camel-cased code) to the distribution name;
/// the relative map sends the distribution name to the camel-cased code.
#[derive(Debug)]
pub struct NameResolver {
    plugins: Vec<ModuleRef>,
    bridges: Vec<ModuleRef>,
    absolute: OnceLock<AliasTable>,
    relative: OnceLock<AliasTable>,
}

impl NameResolver {
    /// Derives aliases for the supplied modules.
    ///
    /// `plugins` may contain the framework reference, which is given the
    /// framework code directly. Names matching no rule are reported to
    /// `inspector` as `naming` failures and keep no code.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::InvalidRule`] when the conventional rules cannot be compiled.
    pub fn new(
        mut plugins: Vec<ModuleRef>,
        mut bridges: Vec<ModuleRef>,
        inspector: &IssueInspector,
    ) -> Result<Self, NamingError> {
        let plugin_rules = NamingRules::conventional(FRAMEWORK_NAME, ModuleKind::Plugin)
            .map_err(|source| NamingError::InvalidRule {
                kind: ModuleKind::Plugin,
                source,
            })?;
        let bridge_rules = NamingRules::conventional(FRAMEWORK_NAME, ModuleKind::Bridge)
            .map_err(|source| NamingError::InvalidRule {
                kind: ModuleKind::Bridge,
                source,
            })?;

        extract_alias_names(&mut plugins, &plugin_rules, inspector);
        extract_alias_names(&mut bridges, &bridge_rules, inspector);

        Ok(Self {
            plugins,
            bridges,
            absolute: OnceLock::new(),
            relative: OnceLock::new(),
        })
    }

    /// Returns the plugin references (framework included) with derived aliases.
    #[must_use]
    pub fn plugin_refs(&self) -> &[ModuleRef] {
        &self.plugins
    }

    /// Returns the bridge references with derived aliases.
    #[must_use]
    pub fn bridge_refs(&self) -> &[ModuleRef] {
        &self.bridges
    }

    /// Returns the reference of kind `kind` known under any alias `name`.
    #[must_use]
    pub fn find(&self, name: &str, kind: ModuleKind) -> Option<&ModuleRef> {
        let original = self.original_name_of(name, kind);
        let refs = match kind {
            ModuleKind::Bridge => &self.bridges,
            ModuleKind::Plugin | ModuleKind::Framework => &self.plugins,
            ModuleKind::Application => return None,
        };
        refs.iter().find(|module| module.name() == original)
    }

    /// Returns the map from every alias to the distribution name.
    #[must_use]
    pub fn absolute_alias_map(&self) -> &AliasTable {
        self.absolute.get_or_init(|| AliasTable {
            plugin: build_absolute_map(&self.plugins),
            bridge: build_absolute_map(&self.bridges),
        })
    }

    /// Returns the map from distribution name to camel-cased code.
    #[must_use]
    pub fn relative_alias_map(&self) -> &AliasTable {
        self.relative.get_or_init(|| AliasTable {
            plugin: build_relative_map(&self.plugins),
            bridge: build_relative_map(&self.bridges),
        })
    }

    /// Resolves any alias to the distribution name.
    ///
    /// The application is always called `application`; unknown names are
    /// returned unchanged.
    #[must_use]
    pub fn original_name_of(&self, name: &str, kind: ModuleKind) -> String {
        if kind == ModuleKind::Application {
            return ModuleKind::Application.as_str().to_owned();
        }
        self.absolute_alias_map()
            .of(kind)
            .and_then(|map| map.get(name))
            .cloned()
            .unwrap_or_else(|| name.to_owned())
    }

    /// Resolves any alias to the camel-cased code used as a config key.
    ///
    /// Falls back to the distribution name when the module has no code.
    #[must_use]
    pub fn default_alias_of(&self, name: &str, kind: ModuleKind) -> String {
        let original = self.original_name_of(name, kind);
        if kind == ModuleKind::Application {
            return original;
        }
        self.relative_alias_map()
            .of(kind)
            .and_then(|map| map.get(&original))
            .cloned()
            .unwrap_or(original)
    }
}

/// Matches each module name against `rules` and records the derived aliases.
///
/// The framework's own package bypasses the rules and receives the framework code.
pub fn extract_alias_names(refs: &mut [ModuleRef], rules: &NamingRules, inspector: &IssueInspector) {
    for module in refs.iter_mut() {
        if module.name() == FRAMEWORK_PACKAGE {
            let name_in_camel = module.name().to_lower_camel_case();
            module.set_aliases(FRAMEWORK_NAME, FRAMEWORK_NAME.to_lower_camel_case(), Some(name_in_camel));
            continue;
        }

        match rules.extract(module.name()) {
            AliasMatch::Matched { code, rule } => {
                let name_in_camel =
                    (module.name() != code).then(|| module.name().to_lower_camel_case());
                let code_in_camel = code.to_lower_camel_case();
                debug!(module = module.name(), code = %code, rule, "alias derived");
                module.set_aliases(code, code_in_camel, name_in_camel);
            }
            AliasMatch::Unmatched => {
                warn!(module = module.name(), kind = %module.kind(), "module name matches no naming rule");
                inspector.collect(
                    IssueRecord::error(Stage::Naming, IssueKind::Module(module.kind()), module.name())
                        .with_stack(format!(
                            "`{}` does not follow any {} naming convention",
                            module.name(),
                            module.kind()
                        ))
                        .with_path(module.path()),
                );
            }
        }
    }
}

fn build_absolute_map(refs: &[ModuleRef]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for module in refs {
        let aliases = [
            Some(module.name()),
            module.name_in_camel(),
            module.code(),
            module.code_in_camel(),
        ];
        for alias in aliases.into_iter().flatten() {
            map.insert(alias.to_owned(), module.name().to_owned());
        }
    }
    map
}

fn build_relative_map(refs: &[ModuleRef]) -> HashMap<String, String> {
    refs.iter()
        .filter_map(|module| {
            module
                .code_in_camel()
                .map(|code| (module.name().to_owned(), code.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use devebot_primitives::RecordingExit;

    use super::*;

    fn inspector() -> IssueInspector {
        IssueInspector::new(Arc::new(RecordingExit::new()))
    }

    fn resolver(inspector: &IssueInspector) -> NameResolver {
        let plugins = vec![
            ModuleRef::plugin("@scope/devebot-plugin-foo", "/opt/foo").unwrap(),
            ModuleRef::plugin("devebot-plugin-mail-sender", "/opt/mail").unwrap(),
            ModuleRef::new(FRAMEWORK_PACKAGE, "/opt/devebot", ModuleKind::Framework).unwrap(),
        ];
        let bridges = vec![ModuleRef::bridge("devebot-co-http-client", "/opt/http").unwrap()];
        NameResolver::new(plugins, bridges, inspector).unwrap()
    }

    #[test]
    fn derives_code_from_scoped_name() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        let foo = &resolver.plugin_refs()[0];
        assert_eq!(foo.code(), Some("foo"));
        assert_eq!(foo.code_in_camel(), Some("foo"));
        assert_eq!(foo.name_in_camel(), Some("scopeDevebotPluginFoo"));
        assert!(inspector.records().is_empty());
    }

    #[test]
    fn framework_gets_its_namespace_code() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        let framework = &resolver.plugin_refs()[2];
        assert_eq!(framework.code(), Some(FRAMEWORK_NAME));
        assert_eq!(resolver.default_alias_of(FRAMEWORK_PACKAGE, ModuleKind::Plugin), "devebot");
    }

    #[test]
    fn unmatched_name_is_collected_once() {
        let inspector = inspector();
        let plugins = vec![ModuleRef::plugin("123-bad!", "/opt/bad").unwrap()];
        let resolver = NameResolver::new(plugins, Vec::new(), &inspector).unwrap();

        let records = inspector.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, Stage::Naming);
        assert!(records[0].has_error);
        assert_eq!(records[0].name, "123-bad!");

        assert_eq!(resolver.plugin_refs()[0].code(), None);
        assert_eq!(resolver.default_alias_of("123-bad!", ModuleKind::Plugin), "123-bad!");
    }

    #[test]
    fn resolves_every_spelling_to_original_name() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        for alias in [
            "devebot-plugin-mail-sender",
            "devebotPluginMailSender",
            "mail-sender",
            "mailSender",
        ] {
            assert_eq!(
                resolver.original_name_of(alias, ModuleKind::Plugin),
                "devebot-plugin-mail-sender"
            );
        }
        assert_eq!(resolver.original_name_of("unknown", ModuleKind::Plugin), "unknown");
        assert_eq!(
            resolver.original_name_of("httpClient", ModuleKind::Bridge),
            "devebot-co-http-client"
        );
        assert_eq!(resolver.original_name_of("anything", ModuleKind::Application), "application");
    }

    #[test]
    fn default_alias_is_camel_code() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        assert_eq!(resolver.default_alias_of("mail-sender", ModuleKind::Plugin), "mailSender");
        assert_eq!(
            resolver.default_alias_of("devebot-co-http-client", ModuleKind::Bridge),
            "httpClient"
        );
        assert_eq!(resolver.default_alias_of("mail-sender", ModuleKind::Bridge), "mail-sender");
    }

    #[test]
    fn alias_round_trip_is_idempotent() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        for code in ["foo", "mailSender", "mail-sender", "devebot", "nope"] {
            let first = resolver.default_alias_of(
                &resolver.original_name_of(code, ModuleKind::Plugin),
                ModuleKind::Plugin,
            );
            for _ in 0..3 {
                let again = resolver.default_alias_of(
                    &resolver.original_name_of(code, ModuleKind::Plugin),
                    ModuleKind::Plugin,
                );
                assert_eq!(again, first);
            }
        }
    }

    #[test]
    fn alias_maps_are_stable() {
        let inspector = inspector();
        let first = resolver(&inspector);
        let second = resolver(&inspector);
        assert_eq!(first.absolute_alias_map(), second.absolute_alias_map());
        assert_eq!(first.relative_alias_map(), second.relative_alias_map());
        assert!(std::ptr::eq(first.absolute_alias_map(), first.absolute_alias_map()));
    }

    #[test]
    fn finds_refs_by_alias() {
        let inspector = inspector();
        let resolver = resolver(&inspector);
        let bridge = resolver.find("httpClient", ModuleKind::Bridge).expect("bridge");
        assert_eq!(bridge.name(), "devebot-co-http-client");
        assert!(resolver.find("foo", ModuleKind::Application).is_none());
    }
}
