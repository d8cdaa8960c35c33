//! Boundary settings loaded from configuration files.
//!
//! This module lets deployments select a recovery policy and reporting
//! thresholds declaratively, from a TOML file with environment variable
//! overrides. Custom recovery functions are code-only and cannot be
//! expressed in a file.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::policy::RecoveryPolicy;
use crate::record::Severity;

/// Which recovery policy a settings file selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// No automatic recovery.
    #[default]
    None,
    /// Delayed retries with optional exponential backoff.
    Retry,
    /// Settle, then clear state and recreate the producer.
    Reset,
}

/// The `[recovery]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoverySettings {
    /// Which policy to run.
    #[serde(default)]
    pub policy: PolicyKind,
    /// Maximum number of automatic retry attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay in milliseconds before the first retry attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Whether the delay doubles on each subsequent attempt.
    #[serde(default = "default_true")]
    pub use_backoff: bool,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            policy: PolicyKind::None,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            use_backoff: true,
        }
    }
}

impl RecoverySettings {
    /// Builds the configured recovery policy.
    pub fn to_policy(&self) -> RecoveryPolicy {
        match self.policy {
            PolicyKind::None => RecoveryPolicy::None,
            PolicyKind::Retry => RecoveryPolicy::retry_with(
                self.max_attempts,
                Duration::from_millis(self.base_delay_ms),
                self.use_backoff,
            ),
            PolicyKind::Reset => RecoveryPolicy::Reset,
        }
    }
}

/// The `[reporting]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportingSettings {
    /// Suppress reports below this severity. `None` reports everything.
    #[serde(default)]
    pub min_severity: Option<Severity>,
    /// Whether to install the built-in tracing log reporter.
    #[serde(default = "default_true")]
    pub log_reporter: bool,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            min_severity: None,
            log_reporter: true,
        }
    }
}

/// Errors that can occur when loading boundary settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file was not found.
    #[error("settings file not found: {0}")]
    FileNotFound(String),

    /// The settings file could not be parsed.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] ConfigError),

    /// The settings file path is invalid.
    #[error("invalid settings path: {0}")]
    InvalidPath(String),

    /// A value failed validation.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Root settings structure for a boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundarySettings {
    /// Recovery policy selection.
    #[serde(default)]
    pub recovery: RecoverySettings,
    /// Reporting thresholds.
    #[serde(default)]
    pub reporting: ReportingSettings,
}

impl BoundarySettings {
    /// Loads settings from a TOML file.
    ///
    /// Environment variables prefixed with `BULKHEAD` override file
    /// values using the format `BULKHEAD__<SECTION>__<KEY>`
    /// (e.g. `BULKHEAD__RECOVERY__MAX_ATTEMPTS=5`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be parsed, or
    /// contains values that fail validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        let path_str = path
            .to_str()
            .ok_or_else(|| SettingsError::InvalidPath(format!("{:?}", path)))?;

        if !path.exists() {
            return Err(SettingsError::FileNotFound(path_str.to_string()));
        }

        let config = Config::builder()
            .add_source(File::with_name(path_str))
            .add_source(
                Environment::with_prefix("BULKHEAD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates loaded values.
    fn validate(&self) -> Result<(), SettingsError> {
        if self.recovery.policy == PolicyKind::Retry && self.recovery.max_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "recovery.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}
