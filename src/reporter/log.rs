//! Reporter that delivers records to the tracing subscriber.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{ReportError, Reporter};
use crate::record::{ErrorRecord, Severity};

/// Delivers captured records to the active tracing subscriber.
///
/// The log level follows the record severity: `low` and `medium` log at
/// info and warn, `high` and `critical` at error. User identifier and
/// custom keys set through the reporter contract are attached to each line.
pub struct LogReporter {
    name: String,
    user_id: Mutex<Option<String>>,
    keys: Mutex<Vec<(String, Value)>>,
}

impl LogReporter {
    /// Creates a log reporter with the default name `log`.
    pub fn new() -> Self {
        Self::named("log")
    }

    /// Creates a log reporter with a custom name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_id: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
        }
    }

    fn annotations(&self) -> String {
        let user = self.user_id.lock().unwrap();
        let keys = self.keys.lock().unwrap();

        let mut parts = Vec::new();
        if let Some(id) = user.as_deref() {
            parts.push(format!("user={}", id));
        }
        for (key, value) in keys.iter() {
            parts.push(format!("{}={}", key, value));
        }
        parts.join(" ")
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reporter for LogReporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError> {
        let annotations = self.annotations();
        match record.severity() {
            Severity::Low => info!(
                kind = record.kind().as_str(),
                source = record.source().unwrap_or(""),
                "{} {}",
                record.message(),
                annotations
            ),
            Severity::Medium => warn!(
                kind = record.kind().as_str(),
                source = record.source().unwrap_or(""),
                "{} {}",
                record.message(),
                annotations
            ),
            Severity::High | Severity::Critical => error!(
                kind = record.kind().as_str(),
                source = record.source().unwrap_or(""),
                "{} {}",
                record.message(),
                annotations
            ),
        }
        Ok(())
    }

    fn set_user_identifier(&self, id: Option<&str>) {
        let mut user = self.user_id.lock().unwrap();
        *user = id.map(str::to_string);
    }

    fn set_custom_key(&self, key: &str, value: Option<Value>) {
        let mut keys = self.keys.lock().unwrap();
        match value {
            Some(value) => {
                if let Some(slot) = keys.iter_mut().find(|(k, _)| k == key) {
                    slot.1 = value;
                } else {
                    keys.push((key.to_string(), value));
                }
            }
            None => keys.retain(|(k, _)| k != key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::text_fault;
    use serde_json::json;

    #[tokio::test]
    async fn test_report_always_succeeds() {
        let reporter = LogReporter::new();
        let record = ErrorRecord::new(text_fault("boom")).with_severity(Severity::Critical);

        assert!(reporter.report(&record).await.is_ok());
    }

    #[test]
    fn test_annotations_include_user_and_keys() {
        let reporter = LogReporter::new();
        reporter.set_user_identifier(Some("user-7"));
        reporter.set_custom_key("release", Some(json!("2.0")));

        let annotations = reporter.annotations();
        assert!(annotations.contains("user=user-7"));
        assert!(annotations.contains("release=\"2.0\""));
    }

    #[test]
    fn test_custom_key_removal() {
        let reporter = LogReporter::new();
        reporter.set_custom_key("release", Some(json!("2.0")));
        reporter.set_custom_key("release", None);

        assert!(!reporter.annotations().contains("release"));
    }

    #[test]
    fn test_named_reporter() {
        let reporter = LogReporter::named("stderr");
        assert_eq!(reporter.name(), "stderr");
    }
}
