//! Error record model for captured faults.
//!
//! This module provides the immutable snapshot type built once per captured
//! fault, together with the severity and kind vocabularies used to describe
//! it. Records are never mutated after construction; overriding a field
//! always produces a new record that preserves everything else.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The opaque fault value carried by a record.
///
/// Faults are shared between the controller, reporters, and the escalation
/// return path, so they are reference counted rather than owned.
pub type FaultPayload = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A plain text fault for manual injection and tests.
#[derive(Debug, Clone)]
pub struct TextFault {
    message: String,
}

impl TextFault {
    /// Creates a new text fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TextFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TextFault {}

/// Wraps a message into a [`FaultPayload`].
pub fn text_fault(message: impl Into<String>) -> FaultPayload {
    Arc::new(TextFault::new(message))
}

/// How serious a captured fault is.
///
/// Severities are ordered, so reporters can gate on a minimum level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or fully recovered faults.
    Low,
    /// Default level for faults with no better information.
    #[default]
    Medium,
    /// Faults that degrade the produced output.
    High,
    /// Faults that make the producer unusable.
    Critical,
}

impl Severity {
    /// Returns the lowercase name used in configuration and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which part of the producer pipeline a fault was attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Fault raised while constructing the producer's output.
    Build,
    /// Fault raised during ordinary producer execution.
    Runtime,
    /// Fault raised in the rendering/layout stage of the pipeline.
    Rendering,
    /// Fault raised while applying a state update.
    State,
    /// Fault attributed to an external collaborator.
    External,
    /// Fault that arrived through the async-fault channel.
    AsyncFault,
    /// Fault with no classification information.
    #[default]
    Unknown,
}

impl FaultKind {
    /// Returns the snake_case name used in configuration and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Build => "build",
            FaultKind::Runtime => "runtime",
            FaultKind::Rendering => "rendering",
            FaultKind::State => "state",
            FaultKind::External => "external",
            FaultKind::AsyncFault => "async_fault",
            FaultKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable snapshot of one captured fault.
///
/// A record is created exactly once per capture, inside the controller, and
/// is only ever handed out by value. The `with_*` methods implement copy
/// semantics: they consume the record and return a new one with the single
/// field overridden.
///
/// Equality covers the fault message, trace, severity, kind, and source.
/// The capture timestamp and context are excluded so a re-derived record
/// compares equal to the original.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    fault: FaultPayload,
    trace: String,
    severity: Severity,
    kind: FaultKind,
    source: Option<String>,
    captured_at: DateTime<Utc>,
    context: Vec<(String, Value)>,
}

impl ErrorRecord {
    /// Creates a record for the given fault with default metadata.
    ///
    /// The capture timestamp is taken at construction time.
    pub fn new(fault: FaultPayload) -> Self {
        Self {
            fault,
            trace: String::new(),
            severity: Severity::default(),
            kind: FaultKind::default(),
            source: None,
            captured_at: Utc::now(),
            context: Vec::new(),
        }
    }

    /// Returns the opaque fault value.
    pub fn fault(&self) -> &FaultPayload {
        &self.fault
    }

    /// Returns the fault rendered as a message.
    pub fn message(&self) -> String {
        self.fault.to_string()
    }

    /// Returns the capture-time stack context. May be empty.
    pub fn trace(&self) -> &str {
        &self.trace
    }

    /// Returns the severity of the fault.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the classification of the fault.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the optional source identifier.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns when the fault was captured.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Returns the context entries in insertion order.
    pub fn context(&self) -> &[(String, Value)] {
        &self.context
    }

    /// Looks up a context value by key.
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns a copy of this record with the trace replaced.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    /// Returns a copy of this record with the severity replaced.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Returns a copy of this record with the kind replaced.
    pub fn with_kind(mut self, kind: FaultKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns a copy of this record with the source identifier replaced.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns a copy of this record with one context entry added.
    ///
    /// An existing entry with the same key is replaced in place, keeping
    /// its position; new keys are appended.
    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if let Some(slot) = self.context.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.context.push((key, value));
        }
        self
    }

    /// Renders the record as JSON for reporter sinks.
    pub fn to_json(&self) -> Value {
        let mut context = Map::new();
        for (key, value) in &self.context {
            context.insert(key.clone(), value.clone());
        }
        json!({
            "message": self.message(),
            "trace": self.trace,
            "severity": self.severity.as_str(),
            "kind": self.kind.as_str(),
            "source": self.source,
            "captured_at": self.captured_at.to_rfc3339(),
            "context": Value::Object(context),
        })
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl PartialEq for ErrorRecord {
    fn eq(&self, other: &Self) -> bool {
        // The fault is an opaque trait object, so it is compared by message.
        self.message() == other.message()
            && self.trace == other.trace
            && self.severity == other.severity
            && self.kind == other.kind
            && self.source == other.source
    }
}

impl Eq for ErrorRecord {}
