//! Validation metadata declared by plugins and bridges.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::{Error, Result};

/// Cross-module constraint checker.
///
/// Receives the module's own configuration slice and the whole sandbox tree.
/// Returning `Ok(false)` or an error marks the configuration as invalid.
pub type ConstraintCheck = Arc<dyn Fn(&Value, &Value) -> anyhow::Result<bool> + Send + Sync>;

/// Validation rules a module declares for its sandbox configuration.
#[derive(Clone, Default)]
pub struct Manifest {
    schema: Option<Value>,
    check_constraints: Option<ConstraintCheck>,
}

impl fmt::Debug for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manifest")
            .field("schema", &self.schema)
            .field("check_constraints", &self.check_constraints.is_some())
            .finish()
    }
}

impl Manifest {
    /// Starts building a [`Manifest`].
    #[must_use]
    pub fn builder() -> ManifestBuilder {
        ManifestBuilder::default()
    }

    /// Reads `{ [root_key]: { "validation": { "schema": ... } } }`.
    ///
    /// Returns `Ok(None)` when the document has no section for `root_key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] when the section exists but is not an
    /// object or its schema is not an object.
    pub fn from_document(document: &Value, root_key: &str) -> Result<Option<Self>> {
        let Some(section) = document.get(root_key) else {
            return Ok(None);
        };
        if !section.is_object() {
            return Err(Error::InvalidManifest {
                reason: format!("section `{root_key}` must be an object"),
            });
        }
        let schema = section.pointer("/validation/schema").cloned();
        if let Some(schema) = &schema {
            if !schema.is_object() {
                return Err(Error::InvalidManifest {
                    reason: format!("schema of `{root_key}` must be an object"),
                });
            }
        }
        Ok(Some(Self {
            schema,
            check_constraints: None,
        }))
    }

    /// Returns the JSON schema, if declared.
    #[must_use]
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Returns the constraint checker, if declared.
    #[must_use]
    pub fn check_constraints(&self) -> Option<&ConstraintCheck> {
        self.check_constraints.as_ref()
    }
}

/// Builder for [`Manifest`].
#[derive(Default)]
pub struct ManifestBuilder {
    schema: Option<Value>,
    check_constraints: Option<ConstraintCheck>,
}

impl fmt::Debug for ManifestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestBuilder")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ManifestBuilder {
    /// Sets the JSON schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] when the schema is not an object.
    pub fn schema(mut self, schema: Value) -> Result<Self> {
        if !schema.is_object() {
            return Err(Error::InvalidManifest {
                reason: "schema must be an object".into(),
            });
        }
        self.schema = Some(schema);
        Ok(self)
    }

    /// Sets the constraint checker.
    #[must_use]
    pub fn check_constraints<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value, &Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.check_constraints = Some(Arc::new(check));
        self
    }

    /// Finishes the manifest.
    #[must_use]
    pub fn build(self) -> Manifest {
        Manifest {
            schema: self.schema,
            check_constraints: self.check_constraints,
        }
    }
}
