//! In-process reporter that buffers records.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ReportError, Reporter};
use crate::record::ErrorRecord;

/// Buffers every reported record in memory.
///
/// Useful in tests and for local inspection of what a boundary reported.
pub struct MemoryReporter {
    name: String,
    records: Mutex<Vec<ErrorRecord>>,
    user_id: Mutex<Option<String>>,
    keys: Mutex<Vec<(String, Value)>>,
}

impl MemoryReporter {
    /// Creates a named in-memory reporter.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
            user_id: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of the buffered records.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Drains and returns the buffered records.
    pub fn take_records(&self) -> Vec<ErrorRecord> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }

    /// Returns the current user identifier.
    pub fn user_identifier(&self) -> Option<String> {
        self.user_id.lock().unwrap().clone()
    }

    /// Looks up a custom key.
    pub fn custom_key(&self, key: &str) -> Option<Value> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl Reporter for MemoryReporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn report(&self, record: &ErrorRecord) -> Result<(), ReportError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn set_user_identifier(&self, id: Option<&str>) {
        *self.user_id.lock().unwrap() = id.map(str::to_string);
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
