//! Reporter capability and fan-out.
//!
//! Reporters deliver captured error records to zero or more sinks. The
//! contract is strictly best-effort: a reporter must never propagate a
//! failure to its caller, and the group additionally isolates each member
//! so a misbehaving reporter cannot break its siblings or the boundary's
//! own state transition.

mod filter;
mod log;
mod memory;

pub use filter::{BeforeSend, FilteredReporter};
pub use log::LogReporter;
pub use memory::MemoryReporter;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::record::ErrorRecord;

/// Errors a reporter can surface from `report`.
///
/// These never leave the fan-out layer; the group logs them and moves on.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The sink rejected or failed to deliver the record.
    #[error("reporter '{reporter}' failed to deliver: {message}")]
    DeliveryFailed {
        /// Name of the failing reporter.
        reporter: String,
        /// Description of the failure.
        message: String,
    },
}

impl ReportError {
    /// Creates a delivery failure for the named reporter.
    pub fn delivery(reporter: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::DeliveryFailed {
            reporter: reporter.into(),
            message: message.into(),
        }
    }
}

/// A sink for captured error records.
///
/// Implementations adapt external services (crash trackers, log pipelines)
/// behind this capability. `report` should contain its own failures; the
/// group wraps each call regardless, so a violation cannot spread.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// A short name identifying this reporter in logs.
    fn name(&self) -> &str;

    /// Delivers one record to the sink.
    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError>;

    /// Associates subsequent reports with a user identifier.
    ///
    /// `None` clears any previous identifier. The default implementation
    /// ignores the call; sinks without user tagging need not override it.
    fn set_user_identifier(&self, _id: Option<&str>) {}

    /// Sets or removes (`None`) a custom key attached to every report.
    ///
    /// The default implementation ignores the call.
    fn set_custom_key(&self, _key: &str, _value: Option<Value>) {}
}

/// An ordered group of reporters dispatched as one.
///
/// `report` fans out to all members concurrently, waits for every member to
/// finish, and never early-exits on individual failure. Each member runs in
/// its own task, so even a panicking reporter is contained. The group is
/// itself a [`Reporter`], so groups compose.
#[derive(Clone, Default)]
pub struct ReporterGroup {
    members: Vec<Arc<dyn Reporter>>,
}

impl ReporterGroup {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group from an ordered list of members.
    pub fn with_members(members: Vec<Arc<dyn Reporter>>) -> Self {
        Self { members }
    }

    /// Appends a member to the group.
    pub fn add(&mut self, reporter: Arc<dyn Reporter>) {
        self.members.push(reporter);
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Dispatches a record to every member and waits for all of them.
    ///
    /// Failures and panics are logged per member; none of them stop the
    /// others or surface to the caller.
    pub async fn dispatch(&self, record: &ErrorRecord) {
        let mut handles = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let member = Arc::clone(member);
            let name = member.name().to_string();
            let record = record.clone();
            let handle = tokio::spawn(async move { member.report(&record).await });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!("reporter '{}' failed: {}", name, err);
                }
                Err(join_err) if join_err.is_panic() => {
                    warn!("reporter '{}' panicked while reporting", name);
                }
                Err(join_err) => {
                    warn!("reporter '{}' was cancelled: {}", name, join_err);
                }
            }
        }
    }
}

#[async_trait]
impl Reporter for ReporterGroup {
    fn name(&self) -> &str {
        "group"
    }

    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError> {
        self.dispatch(record).await;
        Ok(())
    }

    fn set_user_identifier(&self, id: Option<&str>) {
        // Broadcast in list order, no rollback if a member fails.
        for member in &self.members {
            member.set_user_identifier(id);
        }
    }

    fn set_custom_key(&self, key: &str, value: Option<Value>) {
        for member in &self.members {
            member.set_custom_key(key, value.clone());
        }
    }
}
