//! Environment variable lookup.
//!
//! Every bootstrap setting can be supplied under several names. For a variable
//! `VAR` and an application called `demo-app` the lookup order is
//! `DEMO_APP_VAR`, `DEVEBOT_VAR`, `NODE_DEMO_APP_VAR`, `NODE_DEVEBOT_VAR`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::FRAMEWORK_NAME;

/// Source of environment values.
pub trait EnvSource: Send + Sync {
    /// Returns the raw value of `key`, if set.
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of variables, mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one variable.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for MapEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Converts a package name into an environment label: `demo-app` becomes `DEMO_APP`.
#[must_use]
pub fn label_of(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Application-aware view over an [`EnvSource`].
#[derive(Clone)]
pub struct EnvBox {
    source: Arc<dyn EnvSource>,
    app_label: String,
    framework_label: String,
}

impl fmt::Debug for EnvBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvBox")
            .field("source", &"dyn EnvSource")
            .field("app_label", &self.app_label)
            .field("framework_label", &self.framework_label)
            .finish()
    }
}

impl EnvBox {
    /// Creates a view for the given application name.
    #[must_use]
    pub fn new(source: Arc<dyn EnvSource>, app_name: &str) -> Self {
        Self {
            source,
            app_label: label_of(app_name),
            framework_label: label_of(FRAMEWORK_NAME),
        }
    }

    /// Returns the candidate variable names for `var` in precedence order.
    #[must_use]
    pub fn candidates(&self, var: &str) -> Vec<String> {
        let app = &self.app_label;
        let framework = &self.framework_label;
        let mut names = vec![
            format!("{app}_{var}"),
            format!("{framework}_{var}"),
            format!("NODE_{app}_{var}"),
            format!("NODE_{framework}_{var}"),
        ];
        names.dedup();
        names
    }

    /// Returns the first non-empty value among the candidate names.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<String> {
        self.candidates(var)
            .iter()
            .filter_map(|key| self.source.var(key))
            .find(|value| !value.trim().is_empty())
    }

    /// Returns the value of `var` interpreted as a comma separated list.
    #[must_use]
    pub fn list(&self, var: &str) -> Vec<String> {
        self.get(var).map(|raw| split_names(&raw)).unwrap_or_default()
    }

    /// Reads a framework-wide variable (`DEVEBOT_{var}`) without application fallbacks.
    #[must_use]
    pub fn framework_list(&self, var: &str) -> Option<Vec<String>> {
        self.source
            .var(&format!("{}_{var}", self.framework_label))
            .map(|raw| split_names(&raw))
    }

    /// Reads a variable verbatim.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.source.var(key)
    }
}
