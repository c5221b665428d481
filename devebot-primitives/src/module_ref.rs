//! Descriptors of the modules taking part in a bootstrap run.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Manifest, Result};

/// Role a module plays in the composition.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// The application being bootstrapped.
    Application,
    /// The framework itself.
    Framework,
    /// A library module contributing services, triggers, and routines.
    Plugin,
    /// A connector module instantiated once per dialect.
    Bridge,
}

impl ModuleKind {
    /// Returns the lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Framework => "framework",
            Self::Plugin => "plugin",
            Self::Bridge => "bridge",
        }
    }
}

impl Display for ModuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loading hints declared by a module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presets {
    /// Config directory relative to the module root, replacing `config`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    /// Tags describing the shape of the module's config files.
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub config_tags: Vec<String>,
}

impl Presets {
    /// Returns `true` when `tag` is declared.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.config_tags.iter().any(|t| t == tag)
    }
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::One(tag) => vec![tag],
        Tags::Many(tags) => tags,
    })
}

/// Reference to one module: its distribution name, location, and derived aliases.
///
/// `code`, `code_in_camel`, and `name_in_camel` stay empty until the name
/// resolver has matched the name against its naming rules.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRef {
    name: String,
    path: PathBuf,
    #[serde(rename = "type")]
    kind: ModuleKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_in_camel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name_in_camel: Option<String>,
    presets: Presets,
    #[serde(skip)]
    manifest: Option<Arc<Manifest>>,
}

impl PartialEq for ModuleRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.kind == other.kind
            && self.code == other.code
            && self.code_in_camel == other.code_in_camel
            && self.name_in_camel == other.name_in_camel
    }
}

impl ModuleRef {
    /// Creates a reference for a module installed at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleRef`] when the name is blank.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ModuleKind) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidModuleRef {
                name,
                reason: "module name cannot be empty".into(),
            });
        }
        Ok(Self {
            name,
            path: path.into(),
            kind,
            code: None,
            code_in_camel: None,
            name_in_camel: None,
            presets: Presets::default(),
            manifest: None,
        })
    }

    /// Shorthand for a plugin reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleRef`] when the name is blank.
    pub fn plugin(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(name, path, ModuleKind::Plugin)
    }

    /// Shorthand for a bridge reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidModuleRef`] when the name is blank.
    pub fn bridge(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(name, path, ModuleKind::Bridge)
    }

    /// Replaces the presets.
    #[must_use]
    pub fn with_presets(mut self, presets: Presets) -> Self {
        self.presets = presets;
        self
    }

    /// Attaches a validation manifest.
    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(Arc::new(manifest));
        self
    }

    /// Records the aliases derived by the name resolver.
    pub fn set_aliases(
        &mut self,
        code: impl Into<String>,
        code_in_camel: impl Into<String>,
        name_in_camel: Option<String>,
    ) {
        self.code = Some(code.into());
        self.code_in_camel = Some(code_in_camel.into());
        self.name_in_camel = name_in_camel;
    }

    /// Returns the distribution name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the module root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the module kind.
    #[must_use]
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Returns the derived short code.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Returns the camel-cased short code.
    #[must_use]
    pub fn code_in_camel(&self) -> Option<&str> {
        self.code_in_camel.as_deref()
    }

    /// Returns the camel-cased distribution name.
    #[must_use]
    pub fn name_in_camel(&self) -> Option<&str> {
        self.name_in_camel.as_deref()
    }

    /// Returns the module presets.
    #[must_use]
    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    /// Returns the validation manifest, if any.
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_deref()
    }

    /// Directory holding the module's config files.
    #[must_use]
    pub fn config_dir(&self, honor_presets: bool) -> PathBuf {
        match &self.presets.config_dir {
            Some(dir) if honor_presets => self.path.join(dir),
            _ => self.path.join("config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejects_blank_names() {
        let err = ModuleRef::plugin("  ", "/tmp").expect_err("blank name");
        assert!(matches!(err, Error::InvalidModuleRef { .. }));
    }

    #[test]
    fn presets_accept_single_tag() {
        let presets: Presets =
            serde_json::from_value(json!({ "configTags": "bridge[dialect-bridge]" })).unwrap();
        assert!(presets.has_tag("bridge[dialect-bridge]"));

        let presets: Presets =
            serde_json::from_value(json!({ "configTags": ["a", "b"], "configDir": "etc" }))
                .unwrap();
        assert_eq!(presets.config_tags, ["a", "b"]);
        assert_eq!(presets.config_dir.as_deref(), Some(Path::new("etc")));
    }

    #[test]
    fn config_dir_honors_presets_only_when_enabled() {
        let module = ModuleRef::plugin("devebot-plugin-foo", "/opt/foo")
            .unwrap()
            .with_presets(Presets {
                config_dir: Some("etc".into()),
                config_tags: Vec::new(),
            });
        assert_eq!(module.config_dir(true), Path::new("/opt/foo/etc"));
        assert_eq!(module.config_dir(false), Path::new("/opt/foo/config"));
    }

    #[test]
    fn serializes_kind_as_type() {
        let module = ModuleRef::bridge("devebot-co-http", "/opt/http").unwrap();
        let value = serde_json::to_value(&module).unwrap();
        assert_eq!(value["type"], "bridge");
        assert_eq!(value["name"], "devebot-co-http");
    }
}
