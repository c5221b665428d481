//! Diagnostic collection for bootstrap stages.
//!
//! Failures of individual modules are recorded here instead of being returned,
//! so one broken plugin does not stop the others from loading. Barriers decide
//! whether the run may continue.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter, Write as _};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Serializer};
use tracing::{error, info};

use crate::ModuleKind;

/// Bootstrap stage that produced a record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub enum Stage {
    /// Module name did not match any naming rule.
    #[serde(rename = "naming")]
    Naming,
    /// A config file could not be read or parsed.
    #[serde(rename = "config")]
    Config,
    /// A configuration slice failed its manifest schema.
    #[serde(rename = "config/schema")]
    ConfigSchema,
    /// A constraint checker rejected the configuration or failed.
    #[serde(rename = "config/constraints")]
    ConfigConstraints,
    /// A dialect or gadget constructor failed.
    #[serde(rename = "instantiating")]
    Instantiating,
}

impl Stage {
    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Naming => "naming",
            Self::Config => "config",
            Self::ConfigSchema => "config/schema",
            Self::ConfigConstraints => "config/constraints",
            Self::Instantiating => "instantiating",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject of a record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum IssueKind {
    /// A module, identified by its kind.
    Module(ModuleKind),
    /// A config file.
    Config,
    /// A bridge dialect.
    Dialect,
    /// A service gadget.
    Service,
    /// A trigger gadget.
    Trigger,
    /// A routine gadget.
    Routine,
}

impl Serialize for IssueKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Display for IssueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(kind) => Display::fmt(kind, f),
            Self::Config => f.write_str("CONFIG"),
            Self::Dialect => f.write_str("DIALECT"),
            Self::Service => f.write_str("SERVICE"),
            Self::Trigger => f.write_str("TRIGGER"),
            Self::Routine => f.write_str("ROUTINE"),
        }
    }
}

/// One diagnostic entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Stage that produced the record.
    pub stage: Stage,
    /// Subject kind.
    #[serde(rename = "type")]
    pub kind: IssueKind,
    /// Name of the module, file, or constructed object.
    pub name: String,
    /// Whether the record denotes a failure.
    pub has_error: bool,
    /// Error chain or detail message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// File or directory involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl IssueRecord {
    /// Creates a failure record.
    #[must_use]
    pub fn error(stage: Stage, kind: IssueKind, name: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            name: name.into(),
            has_error: true,
            stack: None,
            path: None,
        }
    }

    /// Creates a success record.
    #[must_use]
    pub fn ok(stage: Stage, kind: IssueKind, name: impl Into<String>) -> Self {
        Self {
            has_error: false,
            ..Self::error(stage, kind, name)
        }
    }

    /// Attaches detail text.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attaches a path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Terminates the process.
pub trait ProcessExit: Send + Sync {
    /// Ends the process with `code`. Test doubles may return instead.
    fn exit(&self, code: i32);
}

/// Calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdExit;

impl ProcessExit for StdExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Records exit requests without terminating.
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the requested exit codes in order.
    #[must_use]
    pub fn codes(&self) -> Vec<i32> {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(code);
    }
}

/// Parameters of a barrier checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct BarrierOptions<'a> {
    /// Component raising the barrier.
    pub invoker: &'a str,
    /// Point within the component.
    pub footmark: &'a str,
    /// `Some(false)` silences the exit request.
    pub exit_on_error: Option<bool>,
}

impl<'a> BarrierOptions<'a> {
    /// Creates options that exit on error.
    #[must_use]
    pub const fn new(invoker: &'a str, footmark: &'a str) -> Self {
        Self {
            invoker,
            footmark,
            exit_on_error: None,
        }
    }

    /// Overrides the exit behavior.
    #[must_use]
    pub const fn exit_on_error(mut self, exit: bool) -> Self {
        self.exit_on_error = Some(exit);
        self
    }
}

/// Result of evaluating a barrier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierOutcome {
    /// Number of failure records.
    pub error_count: usize,
    /// Human-readable dump of the failures, when any.
    pub report: Option<String>,
    /// Whether an exit was requested.
    pub exit_requested: bool,
}

impl BarrierOutcome {
    /// Returns `true` when the run may continue.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.error_count == 0
    }
}

/// Collector of [`IssueRecord`]s for one bootstrap run.
pub struct IssueInspector {
    records: Mutex<Vec<IssueRecord>>,
    exit: Arc<dyn ProcessExit>,
}

impl fmt::Debug for IssueInspector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueInspector")
            .field("records", &self.lock().len())
            .field("exit", &"dyn ProcessExit")
            .finish()
    }
}

impl Default for IssueInspector {
    fn default() -> Self {
        Self::new(Arc::new(StdExit))
    }
}

impl IssueInspector {
    /// Creates a collector that terminates through `exit`.
    #[must_use]
    pub fn new(exit: Arc<dyn ProcessExit>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            exit,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<IssueRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores one record.
    pub fn collect(&self, record: IssueRecord) {
        self.lock().push(record);
    }

    /// Stores several records.
    pub fn collect_all<I>(&self, records: I)
    where
        I: IntoIterator<Item = IssueRecord>,
    {
        self.lock().extend(records);
    }

    /// Returns a snapshot of every record.
    #[must_use]
    pub fn records(&self) -> Vec<IssueRecord> {
        self.lock().clone()
    }

    /// Returns the failure records.
    #[must_use]
    pub fn errors(&self) -> Vec<IssueRecord> {
        self.lock().iter().filter(|r| r.has_error).cloned().collect()
    }

    /// Returns `true` when at least one failure was collected.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.lock().iter().any(|r| r.has_error)
    }

    /// Evaluates the collected records.
    ///
    /// With failures present, logs a report grouped by stage and type and,
    /// unless silenced, requests a process exit with code 1.
    pub fn barrier(&self, options: BarrierOptions<'_>) -> BarrierOutcome {
        let errors = self.errors();
        if errors.is_empty() {
            info!(
                invoker = options.invoker,
                footmark = options.footmark,
                "barrier passed"
            );
            return BarrierOutcome {
                error_count: 0,
                report: None,
                exit_requested: false,
            };
        }

        let report = render_report(&errors);
        error!(
            invoker = options.invoker,
            footmark = options.footmark,
            errors = errors.len(),
            "barrier failed:\n{report}"
        );

        let exit_requested = options.exit_on_error != Some(false);
        if exit_requested {
            self.exit(1);
        }

        BarrierOutcome {
            error_count: errors.len(),
            report: Some(report),
            exit_requested,
        }
    }

    /// Terminates the process through the configured [`ProcessExit`].
    pub fn exit(&self, code: i32) {
        self.exit.exit(code);
    }
}

fn render_report(errors: &[IssueRecord]) -> String {
    let mut groups: BTreeMap<(Stage, IssueKind), Vec<&IssueRecord>> = BTreeMap::new();
    for record in errors {
        groups
            .entry((record.stage, record.kind))
            .or_default()
            .push(record);
    }

    let mut out = String::new();
    for ((stage, kind), records) in groups {
        let _ = writeln!(out, "[{stage}] {kind}: {} failure(s)", records.len());
        for record in records {
            let _ = write!(out, "  - {}", record.name);
            if let Some(path) = &record.path {
                let _ = write!(out, " ({})", path.display());
            }
            let _ = writeln!(out);
            if let Some(stack) = &record.stack {
                for line in stack.lines() {
                    let _ = writeln!(out, "      {line}");
                }
            }
        }
    }
    out
}
