//! Sector-scoped loggers and tracers.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{Level, debug, error, info, trace, warn};
use uuid::Uuid;

/// Identifier shared by every logger and tracer of one bootstrap run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(Uuid);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Produces loggers and tracers bound to one sector of the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingFactory {
    sector: String,
    instance_id: InstanceId,
}

impl LoggingFactory {
    /// Creates a root factory for `sector` with a fresh instance id.
    #[must_use]
    pub fn new(sector: impl Into<String>) -> Self {
        Self {
            sector: sector.into(),
            instance_id: InstanceId(Uuid::new_v4()),
        }
    }

    /// Derives a child factory for `sector`, sharing the instance id.
    #[must_use]
    pub fn branch(&self, sector: &str) -> Self {
        Self {
            sector: format!("{}/{sector}", self.sector),
            instance_id: self.instance_id,
        }
    }

    /// Returns the full sector path.
    #[must_use]
    pub fn sector(&self) -> &str {
        &self.sector
    }

    /// Returns the bootstrap instance id.
    #[must_use]
    pub const fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Returns a logger for this sector.
    #[must_use]
    pub fn logger(&self) -> Logger {
        Logger {
            sector: self.sector.clone(),
        }
    }

    /// Returns a tracer for this sector.
    #[must_use]
    pub fn tracer(&self) -> Tracer {
        Tracer {
            sector: self.sector.clone(),
            instance_id: self.instance_id,
        }
    }
}

/// Emits plain messages tagged with a sector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Logger {
    sector: String,
}

impl Logger {
    /// Returns `true` when events at `level` would be recorded.
    #[must_use]
    pub fn has(&self, level: Level) -> bool {
        match level {
            Level::ERROR => tracing::enabled!(Level::ERROR),
            Level::WARN => tracing::enabled!(Level::WARN),
            Level::INFO => tracing::enabled!(Level::INFO),
            Level::DEBUG => tracing::enabled!(Level::DEBUG),
            _ => tracing::enabled!(Level::TRACE),
        }
    }

    /// Records `message` at `level`.
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let sector = self.sector.as_str();
        match level {
            Level::ERROR => error!(sector, "{message}"),
            Level::WARN => warn!(sector, "{message}"),
            Level::INFO => info!(sector, "{message}"),
            Level::DEBUG => debug!(sector, "{message}"),
            _ => trace!(sector, "{message}"),
        }
    }

    /// Returns the sector the logger writes to.
    #[must_use]
    pub fn sector(&self) -> &str {
        &self.sector
    }
}

/// Builds structured trace messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tracer {
    sector: String,
    instance_id: InstanceId,
}

impl Tracer {
    /// Starts an entry with the given fields. Non-object values are stored under `data`.
    #[must_use]
    pub fn add(&self, fields: Value) -> TraceEntry {
        let mut base = Map::new();
        base.insert("instanceId".into(), Value::String(self.instance_id.to_string()));
        base.insert("blockRef".into(), Value::String(self.sector.clone()));
        TraceEntry { fields: base }.add(fields)
    }
}

/// Fields accumulated for one trace message.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceEntry {
    fields: Map<String, Value>,
}

impl TraceEntry {
    /// Adds more fields; later values replace earlier ones.
    #[must_use]
    pub fn add(mut self, fields: Value) -> Self {
        match fields {
            Value::Object(map) => self.fields.extend(map),
            Value::Null => {}
            other => {
                self.fields.insert("data".into(), other);
            }
        }
        self
    }

    /// Renders the entry as one JSON line.
    ///
    /// `${name}` placeholders in `text` are replaced by scalar field values.
    #[must_use]
    pub fn to_message(&self, text: &str, tags: &[&str]) -> String {
        let mut out = self.fields.clone();
        out.insert("tags".into(), Value::from(tags.to_vec()));
        out.insert("text".into(), Value::String(self.interpolate(text)));
        Value::Object(out).to_string()
    }

    fn interpolate(&self, text: &str) -> String {
        let mut rendered = text.to_owned();
        for (key, value) in &self.fields {
            let replacement = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            rendered = rendered.replace(&format!("${{{key}}}"), &replacement);
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn branches_share_instance_id() {
        let root = LoggingFactory::new("demo-app");
        let child = root.branch("http#client1");
        assert_eq!(child.sector(), "demo-app/http#client1");
        assert_eq!(child.instance_id(), root.instance_id());
        assert_eq!(child.logger().sector(), "demo-app/http#client1");
        assert_ne!(LoggingFactory::new("demo-app").instance_id(), root.instance_id());
    }

    #[test]
    fn logger_is_safe_without_subscriber() {
        let logger = LoggingFactory::new("quiet").logger();
        let _ = logger.has(Level::DEBUG);
        logger.log(Level::INFO, "nothing listens");
    }

    #[test]
    fn trace_message_interpolates_fields() {
        let factory = LoggingFactory::new("demo");
        let message = factory
            .tracer()
            .add(json!({ "dialectName": "client1", "count": 2 }))
            .to_message("dialect ${dialectName} built ${count} times", &["constructor-begin"]);

        let parsed: Value = serde_json::from_str(&message).unwrap();
        assert_eq!(parsed["text"], "dialect client1 built 2 times");
        assert_eq!(parsed["tags"], json!(["constructor-begin"]));
        assert_eq!(parsed["blockRef"], "demo");
        assert_eq!(parsed["instanceId"], factory.instance_id().to_string());
    }

    #[test]
    fn scalar_fields_land_under_data() {
        let entry = LoggingFactory::new("demo").tracer().add(json!(42));
        let parsed: Value = serde_json::from_str(&entry.to_message("x", &[])).unwrap();
        assert_eq!(parsed["data"], 42);
    }
}
