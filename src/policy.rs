//! Recovery policies and backoff math.
//!
//! A policy describes what the boundary does after a fault has been
//! contained and reported. Policies are a closed variant set and carry no
//! mutable state of their own; attempt counters and in-progress flags live
//! on the controller.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future type returned by custom recovery functions.
pub type RecoverFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// Caller-supplied recovery logic.
///
/// Resolving to `true` asks the controller to retry; `false` leaves the
/// boundary faulted.
pub type RecoverFn = Arc<dyn Fn() -> RecoverFuture + Send + Sync>;

/// Default maximum number of automatic retry attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the first retry attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Settle delay applied before a policy-driven reset.
pub const RESET_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// What the boundary does after containing a fault.
///
/// Exactly one policy is active on a controller at a time. Matches over
/// this enum are exhaustive so a new variant forces every consumer to be
/// updated.
#[derive(Clone, Default)]
pub enum RecoveryPolicy {
    /// No automatic action; the boundary stays faulted until a manual
    /// `retry()` or `reset()`.
    #[default]
    None,
    /// Retry up to `max_attempts` times, delaying before each attempt.
    Retry {
        /// Maximum number of automatic attempts. Always at least 1.
        max_attempts: u32,
        /// Delay before the first attempt.
        base_delay: Duration,
        /// Whether the delay doubles on each subsequent attempt.
        use_backoff: bool,
    },
    /// Clear the error state after a short settle delay and force the
    /// producer's identity to be recreated.
    Reset,
    /// Delegate recovery entirely to caller-supplied logic.
    Custom {
        /// The recovery function to await.
        recover: RecoverFn,
    },
}

impl RecoveryPolicy {
    /// Creates a retry policy with the default parameters
    /// (3 attempts, 1 second base delay, exponential backoff).
    pub fn retry() -> Self {
        Self::retry_with(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY, true)
    }

    /// Creates a retry policy with explicit parameters.
    ///
    /// `max_attempts` is clamped to at least 1.
    pub fn retry_with(max_attempts: u32, base_delay: Duration, use_backoff: bool) -> Self {
        RecoveryPolicy::Retry {
            max_attempts: max_attempts.max(1),
            base_delay,
            use_backoff,
        }
    }

    /// Creates a custom policy from an async recovery function.
    pub fn custom<F, Fut>(recover: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        RecoveryPolicy::Custom {
            recover: Arc::new(move || Box::pin(recover())),
        }
    }

    /// Returns the delay before retry attempt `attempt` (1-indexed).
    ///
    /// Only the `Retry` variant schedules delayed attempts; every other
    /// variant returns `None`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            RecoveryPolicy::Retry {
                base_delay,
                use_backoff,
                ..
            } => Some(backoff_delay(*base_delay, *use_backoff, attempt)),
            RecoveryPolicy::None => None,
            RecoveryPolicy::Reset => None,
            RecoveryPolicy::Custom { .. } => None,
        }
    }

    /// Returns true if this policy takes any automatic action.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, RecoveryPolicy::None)
    }

    /// Returns the lowercase name of the variant, for logs and settings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RecoveryPolicy::None => "none",
            RecoveryPolicy::Retry { .. } => "retry",
            RecoveryPolicy::Reset => "reset",
            RecoveryPolicy::Custom { .. } => "custom",
        }
    }
}

impl fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPolicy::None => f.write_str("None"),
            RecoveryPolicy::Retry {
                max_attempts,
                base_delay,
                use_backoff,
            } => f
                .debug_struct("Retry")
                .field("max_attempts", max_attempts)
                .field("base_delay", base_delay)
                .field("use_backoff", use_backoff)
                .finish(),
            RecoveryPolicy::Reset => f.write_str("Reset"),
            RecoveryPolicy::Custom { .. } => f.write_str("Custom { .. }"),
        }
    }
}

/// Computes the delay before retry attempt `attempt` (1-indexed).
///
/// With backoff the delay is `base * 2^(attempt - 1)`; without it the
/// delay is constant. The exponent is capped to keep the shift in range.
pub fn backoff_delay(base: Duration, use_backoff: bool, attempt: u32) -> Duration {
    if !use_backoff || attempt <= 1 {
        return base;
    }
    let exponent = (attempt - 1).min(31);
    base.saturating_mul(1u32 << exponent)
}
