//! Schema validation of configuration slices.

use serde::Serialize;
use serde_json::Value;

/// Outcome of validating one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// Whether the object satisfies the schema.
    pub valid: bool,
    /// Human-readable violations; empty when valid.
    pub errors: Vec<String>,
}

impl Validation {
    /// A passing result.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result with the supplied messages.
    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Pure validator of JSON objects against JSON schemas.
pub trait SchemaValidator: Send + Sync {
    /// Validates `object` against `schema`.
    fn validate(&self, object: &Value, schema: &Value) -> Validation;
}

/// Draft-04 validator backed by the `jsonschema` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, object: &Value, schema: &Value) -> Validation {
        let validator = match jsonschema::draft4::new(schema) {
            Ok(validator) => validator,
            Err(err) => return Validation::failed(vec![format!("invalid schema: {err}")]),
        };
        let errors: Vec<String> = validator
            .iter_errors(object)
            .map(|err| err.to_string())
            .collect();
        if errors.is_empty() {
            Validation::ok()
        } else {
            Validation::failed(errors)
        }
    }
}
