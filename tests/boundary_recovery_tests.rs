//! Integration tests for the fault-containment system.
//!
//! These tests exercise the boundary end-to-end: capture and state
//! transitions, retry backoff, reset semantics, custom recovery, reporter
//! fan-out with per-reporter filtering, async-fault channel routing, and
//! settings loading.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulkhead::{
    text_fault, AsyncFaultChannel, BoundaryConfig, BoundaryController, ErrorRecord, FaultKind,
    FaultScope, FilteredReporter, MemoryReporter, RecoveryPolicy, ReportError, Reporter,
    ReporterGroup, Severity, TextFault,
};

/// Polls a condition until it holds or a generous timeout expires.
async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

/// A reporter that always fails, counting invocations.
struct FailingReporter {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Reporter for FailingReporter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn report(&self, _record: &ErrorRecord) -> Result<(), ReportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ReportError::delivery("failing", "sink unreachable"))
    }
}

// ============================================================================
// Capture and Manual Transition Tests
// ============================================================================

#[tokio::test]
async fn test_capture_faults_until_manual_retry() {
    let controller = BoundaryController::new(BoundaryConfig::new());

    let outcome = controller.trigger_error(text_fault("boom"), None);
    assert!(outcome.is_contained());
    assert!(controller.has_error());

    assert!(controller.retry());
    assert!(!controller.has_error());
}

#[tokio::test]
async fn test_retry_keeps_generation_reset_advances_it() {
    let controller = BoundaryController::new(BoundaryConfig::new());

    controller.trigger_error(text_fault("boom"), None);
    let generation = controller.generation();
    controller.retry();
    assert_eq!(controller.generation(), generation);
    assert_eq!(controller.attempt_count(), 1);

    controller.trigger_error(text_fault("boom"), None);
    controller.reset();
    assert_eq!(controller.generation(), generation + 1);
    assert_eq!(controller.attempt_count(), 0);
}

#[tokio::test]
async fn test_double_reset_from_healthy_is_noop() {
    let controller = BoundaryController::new(BoundaryConfig::new());

    controller.trigger_error(text_fault("boom"), None);
    assert!(controller.reset());
    let generation = controller.generation();

    assert!(!controller.reset());
    assert_eq!(controller.generation(), generation);
}

#[tokio::test]
async fn test_last_writer_wins_on_reentrant_capture() {
    let controller = BoundaryController::new(BoundaryConfig::new());

    controller.trigger_error(text_fault("first"), None);
    controller.trigger_error(text_fault("second"), None);

    assert_eq!(controller.current_error().unwrap().message(), "second");
}

#[tokio::test]
async fn test_disposed_controller_is_inert() {
    let controller = BoundaryController::new(BoundaryConfig::new());
    controller.dispose();

    assert!(controller
        .trigger_error(text_fault("late"), None)
        .is_ignored());
    assert!(!controller.has_error());
    assert!(!controller.retry());
    assert!(!controller.reset());
}

// ============================================================================
// Retry Backoff Tests
// ============================================================================

#[test]
fn test_backoff_delays_double_geometrically() {
    let policy = RecoveryPolicy::retry_with(3, Duration::from_secs(1), true);

    assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
    assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(2)));
    assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(4)));
}

#[test]
fn test_delay_is_constant_without_backoff() {
    let policy = RecoveryPolicy::retry_with(3, Duration::from_secs(1), false);

    for attempt in 1..=3 {
        assert_eq!(
            policy.delay_for_attempt(attempt),
            Some(Duration::from_secs(1))
        );
    }
}

// ============================================================================
// Scenario A: Retry Policy Against an Always-Failing Producer
// ============================================================================

#[tokio::test]
async fn test_retry_to_exhaustion_then_stay_faulted() {
    let controller = BoundaryController::new(BoundaryConfig::new().with_policy(
        RecoveryPolicy::retry_with(3, Duration::from_millis(10), true),
    ));

    // The producer always fails: every time the boundary goes healthy,
    // re-executing it captures a new fault immediately.
    controller.trigger_error(text_fault("always fails"), None);
    for expected_attempt in 1..=3u32 {
        wait_for(|| !controller.has_error()).await;
        assert_eq!(controller.attempt_count(), expected_attempt);
        controller.trigger_error(text_fault("always fails"), None);
    }

    // Attempts are exhausted: no further scheduled action.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(controller.has_error());
    assert_eq!(controller.attempt_count(), 3);
    assert!(!controller.recovery_in_progress());
}

// ============================================================================
// Scenario B: Custom Recovery
// ============================================================================

#[tokio::test]
async fn test_custom_recovery_success_heals_boundary() {
    let runs = Arc::new(AtomicU32::new(0));
    let runs_clone = runs.clone();
    let controller =
        BoundaryController::new(BoundaryConfig::new().with_policy(RecoveryPolicy::custom(
            move || {
                let runs = runs_clone.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    true
                }
            },
        )));

    controller.trigger_error(text_fault("boom"), None);
    wait_for(|| !controller.has_error()).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(controller.attempt_count(), 1);
}

#[tokio::test]
async fn test_custom_recovery_failure_stays_faulted() {
    let controller = BoundaryController::new(
        BoundaryConfig::new().with_policy(RecoveryPolicy::custom(|| async { false })),
    );

    controller.trigger_error(text_fault("boom"), None);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(controller.has_error());
    assert_eq!(controller.attempt_count(), 0);
}

// ============================================================================
// Scenario C: Per-Reporter Severity Filtering
// ============================================================================

#[tokio::test]
async fn test_low_severity_reaches_unfiltered_reporter_only() {
    let unfiltered = Arc::new(MemoryReporter::new("unfiltered"));
    let gated_sink = Arc::new(MemoryReporter::new("gated"));
    let gated = Arc::new(FilteredReporter::new(gated_sink.clone()).with_min_severity(Severity::High));

    let group = ReporterGroup::with_members(vec![unfiltered.clone(), gated]);
    let record = ErrorRecord::new(text_fault("minor glitch")).with_severity(Severity::Low);
    group.dispatch(&record).await;

    assert_eq!(unfiltered.records().len(), 1);
    assert!(gated_sink.records().is_empty());
}

#[tokio::test]
async fn test_before_send_downgrades_severity_per_reporter() {
    let plain = Arc::new(MemoryReporter::new("plain"));
    let rewriting_sink = Arc::new(MemoryReporter::new("rewriting"));
    let rewriting = Arc::new(
        FilteredReporter::new(rewriting_sink.clone())
            .with_before_send(|record| Some(record.with_severity(Severity::Low))),
    );

    let group = ReporterGroup::with_members(vec![plain.clone(), rewriting]);
    let record = ErrorRecord::new(text_fault("boom")).with_severity(Severity::Critical);
    group.dispatch(&record).await;

    // The transform applies to one reporter, never globally.
    assert_eq!(plain.records()[0].severity(), Severity::Critical);
    assert_eq!(rewriting_sink.records()[0].severity(), Severity::Low);
}

// ============================================================================
// Scenario D: No Policy
// ============================================================================

#[tokio::test]
async fn test_none_policy_waits_for_manual_intervention() {
    let controller = BoundaryController::new(BoundaryConfig::new());

    controller.trigger_error(text_fault("boom"), None);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(controller.has_error());
    assert!(!controller.recovery_in_progress());

    assert!(controller.retry());
    assert!(!controller.has_error());
}

// ============================================================================
// Reporter Isolation Tests
// ============================================================================

#[tokio::test]
async fn test_failing_reporter_cannot_break_siblings_or_capture() {
    let calls = Arc::new(AtomicU32::new(0));
    let failing = Arc::new(FailingReporter {
        calls: calls.clone(),
    });
    let memory = Arc::new(MemoryReporter::new("memory"));

    let controller = BoundaryController::new(
        BoundaryConfig::new()
            .with_reporter(failing)
            .with_reporter(memory.clone()),
    );

    let outcome = controller.trigger_error(text_fault("boom"), None);
    assert!(outcome.is_contained());

    wait_for(|| !memory.records().is_empty()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(memory.records().len(), 1);
    assert!(controller.has_error());
}

// ============================================================================
// Reset Policy Tests
// ============================================================================

#[tokio::test]
async fn test_reset_policy_recreates_producer_after_settle() {
    let controller =
        BoundaryController::new(BoundaryConfig::new().with_policy(RecoveryPolicy::Reset));
    let mut generations = controller.subscribe_generation();

    controller.trigger_error(text_fault("boom"), None);
    wait_for(|| !controller.has_error()).await;

    generations.changed().await.unwrap();
    assert_eq!(*generations.borrow(), 1);
    assert_eq!(controller.attempt_count(), 0);
}

// ============================================================================
// Stale Recovery Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_manual_reset_outraces_scheduled_retry() {
    let controller = BoundaryController::new(BoundaryConfig::new().with_policy(
        RecoveryPolicy::retry_with(3, Duration::from_millis(50), false),
    ));

    controller.trigger_error(text_fault("boom"), None);
    wait_for(|| controller.recovery_in_progress()).await;

    controller.reset();
    let generation = controller.generation();

    // The abandoned retry must not fire after its delay elapses.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!controller.has_error());
    assert_eq!(controller.attempt_count(), 0);
    assert_eq!(controller.generation(), generation);
}

// ============================================================================
// Async-Fault Channel Tests
// ============================================================================

#[tokio::test]
async fn test_channel_fault_routes_through_identical_path() {
    let channel = Arc::new(AsyncFaultChannel::new());
    let memory = Arc::new(MemoryReporter::new("memory"));
    let callbacks = Arc::new(AtomicU32::new(0));
    let callbacks_clone = callbacks.clone();

    let controller = BoundaryController::new(
        BoundaryConfig::new()
            .with_reporter(memory.clone())
            .on_error(move |_| {
                callbacks_clone.fetch_add(1, Ordering::SeqCst);
            }),
    );
    controller.attach_channel(&channel);

    assert!(channel.raise(&text_fault("background failure"), Some("in task")));
    wait_for(|| controller.has_error()).await;

    let record = controller.current_error().unwrap();
    assert_eq!(record.kind(), FaultKind::AsyncFault);
    assert_eq!(record.trace(), "in task");
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    wait_for(|| !memory.records().is_empty()).await;
}

#[tokio::test]
async fn test_disposal_restores_host_fault_handling() {
    let channel = Arc::new(AsyncFaultChannel::new());
    let host_hits = Arc::new(AtomicU32::new(0));
    let hits = host_hits.clone();
    channel.install(Arc::new(move |_, _| {
        hits.fetch_add(1, Ordering::SeqCst);
        true
    }));

    let controller = BoundaryController::new(BoundaryConfig::new());
    controller.attach_channel(&channel);

    // While attached, the boundary claims faults ahead of the host.
    channel.raise(&text_fault("claimed"), None);
    assert_eq!(host_hits.load(Ordering::SeqCst), 0);

    controller.dispose();
    channel.raise(&text_fault("unclaimed"), None);
    assert_eq!(host_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fault_scope_funnels_task_failures() {
    let controller = BoundaryController::new(BoundaryConfig::new());
    let scope = FaultScope::new(controller.clone());

    scope.spawn(async { Err(TextFault::new("spawned task failed")) });
    wait_for(|| controller.has_error()).await;

    let record = controller.current_error().unwrap();
    assert_eq!(record.kind(), FaultKind::AsyncFault);
    assert_eq!(record.message(), "spawned task failed");
}

// ============================================================================
// Escalation Tests
// ============================================================================

#[tokio::test]
async fn test_escalated_fault_is_returned_after_containment() {
    let memory = Arc::new(MemoryReporter::new("memory"));
    let controller = BoundaryController::new(
        BoundaryConfig::new()
            .with_reporter(memory.clone())
            .escalate_if(|_| true),
    );

    let outcome = controller.trigger_error(text_fault("boom"), None);
    let fault = outcome.escalated_fault().expect("should escalate");
    assert_eq!(fault.to_string(), "boom");

    // Local containment still happened.
    assert!(controller.has_error());
    wait_for(|| !memory.records().is_empty()).await;
}

// ============================================================================
// Settings Tests
// ============================================================================

#[test]
fn test_settings_file_selects_retry_policy() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("boundary.toml");
    let mut file = std::fs::File::create(&path).expect("Failed to create file");
    writeln!(
        file,
        "[recovery]\npolicy = \"retry\"\nmax_attempts = 2\nbase_delay_ms = 10\nuse_backoff = true"
    )
    .expect("Failed to write settings");

    let settings = bulkhead::BoundarySettings::load(&path).expect("Failed to load settings");
    match settings.recovery.to_policy() {
        RecoveryPolicy::Retry {
            max_attempts,
            base_delay,
            use_backoff,
        } => {
            assert_eq!(max_attempts, 2);
            assert_eq!(base_delay, Duration::from_millis(10));
            assert!(use_backoff);
        }
        other => panic!("expected Retry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_settings_driven_boundary_end_to_end() {
    use std::io::Write;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("boundary.toml");
    let mut file = std::fs::File::create(&path).expect("Failed to create file");
    writeln!(
        file,
        "[recovery]\npolicy = \"retry\"\nmax_attempts = 1\nbase_delay_ms = 10\nuse_backoff = false"
    )
    .expect("Failed to write settings");

    let settings = bulkhead::BoundarySettings::load(&path).expect("Failed to load settings");
    let controller = BoundaryController::new(
        BoundaryConfig::new().with_policy(settings.recovery.to_policy()),
    );

    controller.trigger_error(text_fault("boom"), None);
    wait_for(|| !controller.has_error()).await;
    assert_eq!(controller.attempt_count(), 1);
}
