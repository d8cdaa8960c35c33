//! Bulkhead - fault isolation and recovery control.
//!
//! A bulkhead isolates faults raised while producing a unit of output
//! (rendering a subtree, running a job, any re-executable callback),
//! contains them, reports them to pluggable sinks, and drives a recovery
//! policy that decides whether to retry, reset, run custom recovery
//! logic, or wait for manual intervention.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bulkhead::{BoundaryConfig, BoundaryController, LogReporter, RecoveryPolicy};
//!
//! # async fn example() {
//! let controller = BoundaryController::new(
//!     BoundaryConfig::new()
//!         .with_policy(RecoveryPolicy::retry_with(3, Duration::from_secs(1), true))
//!         .with_reporter(Arc::new(LogReporter::new())),
//! );
//!
//! // The host captures producer faults...
//! controller.trigger_error(bulkhead::text_fault("producer failed"), None);
//!
//! // ...and watches the generation token to know when to rebuild.
//! let _generation = controller.subscribe_generation();
//! # }
//! ```

pub mod boundary;
pub mod channel;
pub mod classify;
pub mod logging;
pub mod policy;
pub mod record;
pub mod reporter;
pub mod settings;

// Re-export the main types for convenient access
pub use boundary::{BoundaryConfig, BoundaryController, CaptureOutcome};
pub use channel::{AsyncFaultChannel, FaultHandler, FaultScope, HandlerId};
pub use classify::{FaultOrigin, KindDetector, KindPattern};
pub use policy::{RecoverFn, RecoveryPolicy};
pub use record::{text_fault, ErrorRecord, FaultKind, FaultPayload, Severity, TextFault};
pub use reporter::{
    FilteredReporter, LogReporter, MemoryReporter, ReportError, Reporter, ReporterGroup,
};
pub use settings::{BoundarySettings, SettingsError};
