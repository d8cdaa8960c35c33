//! Fault classification inference.
//!
//! When a capture arrives without an explicit classification, the controller
//! infers one from the channel the fault arrived on and from its message
//! content, using regex-based pattern matching. This is a best-effort
//! heuristic, not a contract: callers that need a precise classification
//! must supply one explicitly.

use regex::Regex;

use crate::record::{FaultKind, Severity};

/// The channel a captured fault arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// Raised during the producer's normal execution path.
    Producer,
    /// Arrived through the async-fault channel.
    Channel,
}

/// A single inference rule matching fault messages to a classification.
#[derive(Debug)]
pub struct KindPattern {
    /// The compiled regex pattern.
    regex: Regex,
    /// The kind to assign when this pattern matches.
    kind: FaultKind,
    /// The severity to assign when this pattern matches.
    severity: Severity,
    /// A human-readable description of what this pattern detects.
    description: String,
}

impl KindPattern {
    /// Creates a new inference rule.
    ///
    /// # Panics
    /// Panics if the regex pattern is invalid.
    pub fn new(
        pattern: &str,
        kind: FaultKind,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            regex: Regex::new(pattern).expect("Invalid kind pattern"),
            kind,
            severity,
            description: description.into(),
        }
    }

    /// Returns the kind assigned on match.
    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the severity assigned on match.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks if this pattern matches the given message.
    pub fn matches(&self, message: &str) -> bool {
        self.regex.is_match(message)
    }
}

/// An inferred classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inference {
    /// The inferred kind.
    pub kind: FaultKind,
    /// The inferred severity.
    pub severity: Severity,
}

/// Classifies faults from message content using pattern matching.
#[derive(Debug)]
pub struct KindDetector {
    /// The list of patterns to match against, in priority order.
    patterns: Vec<KindPattern>,
}

impl Default for KindDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl KindDetector {
    /// Creates a detector with the built-in pipeline patterns.
    pub fn new() -> Self {
        Self {
            patterns: Self::default_patterns(),
        }
    }

    /// Creates a detector with custom patterns.
    pub fn with_patterns(patterns: Vec<KindPattern>) -> Self {
        Self { patterns }
    }

    /// Returns the built-in patterns for producer pipeline faults.
    fn default_patterns() -> Vec<KindPattern> {
        vec![
            // Build pipeline (highest priority)
            KindPattern::new(
                r"(?i)\bbuild(ing)?\s+(failed|error|phase)",
                FaultKind::Build,
                Severity::High,
                "Producer build failure",
            ),
            KindPattern::new(
                r"(?i)\bduring\s+build\b",
                FaultKind::Build,
                Severity::High,
                "Fault attributed to the build phase",
            ),
            // Rendering pipeline
            KindPattern::new(
                r"(?i)\brender(ing|er)?\b",
                FaultKind::Rendering,
                Severity::High,
                "Rendering stage failure",
            ),
            KindPattern::new(
                r"(?i)\blayout\b|\bpaint(ing)?\b",
                FaultKind::Rendering,
                Severity::High,
                "Layout or paint failure",
            ),
            // State updates
            KindPattern::new(
                r"(?i)\bstate\s+(update|change|transition)",
                FaultKind::State,
                Severity::Medium,
                "State update failure",
            ),
            KindPattern::new(
                r"(?i)\binvalid\s+state\b",
                FaultKind::State,
                Severity::Medium,
                "Invalid state detected",
            ),
            // External collaborators
            KindPattern::new(
                r"(?i)\bnetwork\b|\bconnection\b|\bexternal service\b",
                FaultKind::External,
                Severity::Medium,
                "External collaborator failure",
            ),
        ]
    }

    /// Returns the configured patterns.
    pub fn patterns(&self) -> &[KindPattern] {
        &self.patterns
    }

    /// Infers a classification from message content alone.
    ///
    /// Returns `None` when no pattern matches.
    pub fn infer(&self, message: &str) -> Option<Inference> {
        self.patterns.iter().find(|p| p.matches(message)).map(|p| {
            Inference {
                kind: p.kind(),
                severity: p.severity(),
            }
        })
    }

    /// Infers a classification for a fault, taking its arrival channel
    /// into account.
    ///
    /// Faults that arrived on the async channel classify as
    /// [`FaultKind::AsyncFault`] before any message pattern runs; producer
    /// faults with no matching pattern fall back to [`FaultKind::Runtime`].
    pub fn infer_for_origin(&self, origin: FaultOrigin, message: &str) -> Inference {
        match origin {
            FaultOrigin::Channel => Inference {
                kind: FaultKind::AsyncFault,
                severity: Severity::Medium,
            },
            FaultOrigin::Producer => self.infer(message).unwrap_or(Inference {
                kind: FaultKind::Runtime,
                severity: Severity::Medium,
            }),
        }
    }
}
