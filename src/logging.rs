//! Logging setup for diagnostics.
//!
//! The boundary reports its own activity (captures, retries, reporter
//! failures) through `tracing`. This module wires a subscriber that
//! writes to stderr, so host applications that speak a protocol on
//! stdout are not disturbed, with levels configurable via `RUST_LOG`
//! or programmatically.

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Log level for boundary diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level - state transitions and recovery scheduling
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warning level - reporter failures, exhausted retries
    Warn,
    /// Error level - least verbose
    Error,
    /// Disable logging entirely
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
            LogLevel::Off => Level::ERROR, // Filtered out by directive
        }
    }
}

/// Configuration for the diagnostics subscriber.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: LogLevel,
    /// Whether to include timestamps
    pub with_timestamps: bool,
    /// Whether to include the target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Set whether to include timestamps.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    /// Set whether to include the target (module path).
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }
}

/// Initialize the diagnostics subscriber with the given configuration.
///
/// Call once at application start. `RUST_LOG`, when set, takes precedence
/// over the configured level.
///
/// # Examples
///
/// ```no_run
/// use bulkhead::logging::{init_logging, LogLevel, LoggingConfig};
///
/// init_logging(LoggingConfig::new().with_level(LogLevel::Debug));
/// ```
pub fn init_logging(config: LoggingConfig) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.directive())
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    if config.with_timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}

/// Initialize logging with default configuration: info level, timestamps,
/// module targets, output to stderr.
pub fn init_default_logging() {
    init_logging(LoggingConfig::default());
}
