//! Boundary configuration and the fault-containment controller.
//!
//! A boundary isolates faults raised while producing a unit of output,
//! contains them, and drives a recovery policy. This module provides the
//! configuration builder, the capture outcome type, and the
//! [`BoundaryController`] state machine.

mod controller;

pub use controller::BoundaryController;

use std::fmt;
use std::sync::Arc;

use crate::classify::KindDetector;
use crate::policy::RecoveryPolicy;
use crate::record::{ErrorRecord, FaultPayload};
use crate::reporter::Reporter;

/// Callback invoked synchronously with each captured record.
pub type ErrorCallback = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;

/// Predicate deciding whether a fault is re-raised to the enclosing
/// context after local containment.
pub type EscalatePredicate = Arc<dyn Fn(&FaultPayload) -> bool + Send + Sync>;

/// What happened to a captured fault.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// The fault was contained locally; nothing leaves the boundary.
    Contained,
    /// The fault was contained locally and the caller should additionally
    /// re-raise it to the enclosing context.
    Escalated(FaultPayload),
    /// The controller was already disposed; the capture was a no-op.
    Ignored,
}

impl CaptureOutcome {
    /// Returns true if the fault was contained without escalation.
    pub fn is_contained(&self) -> bool {
        matches!(self, CaptureOutcome::Contained)
    }

    /// Returns true if the caller should re-raise the fault.
    pub fn is_escalated(&self) -> bool {
        matches!(self, CaptureOutcome::Escalated(_))
    }

    /// Returns true if the capture hit a disposed controller.
    pub fn is_ignored(&self) -> bool {
        matches!(self, CaptureOutcome::Ignored)
    }

    /// Returns the fault to re-raise, if escalation was requested.
    pub fn escalated_fault(&self) -> Option<&FaultPayload> {
        match self {
            CaptureOutcome::Escalated(fault) => Some(fault),
            CaptureOutcome::Contained => None,
            CaptureOutcome::Ignored => None,
        }
    }
}

/// Configuration for a boundary controller.
///
/// Built once and handed to [`BoundaryController::new`]; the controller
/// owns it for its whole lifetime.
pub struct BoundaryConfig {
    pub(crate) policy: RecoveryPolicy,
    pub(crate) reporters: Vec<Arc<dyn Reporter>>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) should_escalate: Option<EscalatePredicate>,
    pub(crate) detector: KindDetector,
}

impl BoundaryConfig {
    /// Creates a configuration with no reporters, no callbacks, and the
    /// `None` recovery policy.
    pub fn new() -> Self {
        Self {
            policy: RecoveryPolicy::default(),
            reporters: Vec::new(),
            on_error: None,
            should_escalate: None,
            detector: KindDetector::new(),
        }
    }

    /// Sets the active recovery policy.
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends a reporter to the fan-out list.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Replaces the fan-out list.
    pub fn with_reporters(mut self, reporters: Vec<Arc<dyn Reporter>>) -> Self {
        self.reporters = reporters;
        self
    }

    /// Sets the callback invoked synchronously with each captured record.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErrorRecord) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Sets the predicate deciding whether a fault is re-raised to the
    /// enclosing context after local containment.
    pub fn escalate_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FaultPayload) -> bool + Send + Sync + 'static,
    {
        self.should_escalate = Some(Arc::new(predicate));
        self
    }

    /// Replaces the classification detector.
    pub fn with_detector(mut self, detector: KindDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Returns the configured recovery policy.
    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BoundaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryConfig")
            .field("policy", &self.policy)
            .field("reporters", &self.reporters.len())
            .field("on_error", &self.on_error.is_some())
            .field("should_escalate", &self.should_escalate.is_some())
            .finish()
    }
}
