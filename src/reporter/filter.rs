//! Per-reporter before-send filtering.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ReportError, Reporter};
use crate::record::{ErrorRecord, Severity};

/// A before-send hook applied to a record before delivery.
///
/// Returning `None` suppresses the report for this reporter only; returning
/// `Some` delivers the (possibly rewritten) record.
pub type BeforeSend = Arc<dyn Fn(ErrorRecord) -> Option<ErrorRecord> + Send + Sync>;

/// Wraps a reporter with a local severity gate and before-send transform.
///
/// Filtering is strictly per-reporter: a suppressed record still reaches
/// every other member of the group.
#[derive(Clone)]
pub struct FilteredReporter {
    inner: Arc<dyn Reporter>,
    min_severity: Option<Severity>,
    before_send: Option<BeforeSend>,
}

impl FilteredReporter {
    /// Wraps the given reporter with no filtering configured.
    pub fn new(inner: Arc<dyn Reporter>) -> Self {
        Self {
            inner,
            min_severity: None,
            before_send: None,
        }
    }

    /// Suppresses records below the given severity.
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Installs a before-send hook.
    pub fn with_before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(ErrorRecord) -> Option<ErrorRecord> + Send + Sync + 'static,
    {
        self.before_send = Some(Arc::new(hook));
        self
    }

    /// Returns the configured minimum severity, if any.
    pub fn min_severity(&self) -> Option<Severity> {
        self.min_severity
    }
}

#[async_trait]
impl Reporter for FilteredReporter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError> {
        if let Some(min) = self.min_severity {
            if record.severity() < min {
                return Ok(());
            }
        }

        let outgoing = match &self.before_send {
            Some(hook) => match hook(record.clone()) {
                Some(rewritten) => rewritten,
                None => return Ok(()),
            },
            None => record.clone(),
        };

        self.inner.report(&outgoing).await
    }

    fn set_user_identifier(&self, id: Option<&str>) {
        self.inner.set_user_identifier(id);
    }

    fn set_custom_key(&self, key: &str, value: Option<Value>) {
        self.inner.set_custom_key(key, value);
    }
}
