//! The fault-containment state machine.
//!
//! A controller is either `Healthy` (no current error) or `Faulted`. Every
//! capture, retry, and reset is a discrete, serialized state transition:
//! callers may race from any task, but transitions are applied under a
//! single lock and stamped with a monotonically increasing epoch. Scheduled
//! recovery work carries the epoch it was scheduled under and is discarded
//! if any competing transition has run in the meantime.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{BoundaryConfig, CaptureOutcome, ErrorCallback, EscalatePredicate};
use crate::channel::{AsyncFaultChannel, FaultHandler, HandlerId};
use crate::classify::{FaultOrigin, KindDetector};
use crate::policy::{backoff_delay, RecoverFn, RecoveryPolicy, RESET_SETTLE_DELAY};
use crate::record::{ErrorRecord, FaultKind, FaultPayload, Severity};
use crate::reporter::ReporterGroup;

/// Mutable controller state, guarded by one mutex.
struct RecoveryState {
    current_error: Option<ErrorRecord>,
    attempt_count: u32,
    recovery_in_progress: bool,
    /// Transition counter. Bumped on capture, retry, and reset; scheduled
    /// recovery acts only if the epoch it was born under is still current.
    epoch: u64,
    recovery_task: Option<JoinHandle<()>>,
}

impl RecoveryState {
    fn new() -> Self {
        Self {
            current_error: None,
            attempt_count: 0,
            recovery_in_progress: false,
            epoch: 0,
            recovery_task: None,
        }
    }

    /// Aborts a pending scheduled recovery, if any.
    fn abandon_pending(&mut self) {
        if let Some(handle) = self.recovery_task.take() {
            handle.abort();
        }
        self.recovery_in_progress = false;
    }
}

struct Inner {
    policy: RecoveryPolicy,
    reporters: ReporterGroup,
    on_error: Option<ErrorCallback>,
    should_escalate: Option<EscalatePredicate>,
    detector: KindDetector,
    state: Mutex<RecoveryState>,
    /// Producer identity token. Advanced only by reset, so the host knows
    /// to construct a fresh producer rather than re-execute the old one.
    generation: watch::Sender<u64>,
    disposed: AtomicBool,
    channel: Mutex<Option<(Arc<AsyncFaultChannel>, HandlerId)>>,
}

impl Inner {
    fn advance_generation(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }
}

/// Owns the error state of one boundary and drives its recovery policy.
///
/// Cloning the controller produces another handle to the same boundary;
/// all handles share one state machine. Captures must run inside a tokio
/// runtime because reporting and recovery are driven by spawned tasks.
#[derive(Clone)]
pub struct BoundaryController {
    inner: Arc<Inner>,
}

impl BoundaryController {
    /// Creates a controller from the given configuration.
    pub fn new(config: BoundaryConfig) -> Self {
        let BoundaryConfig {
            policy,
            reporters,
            on_error,
            should_escalate,
            detector,
        } = config;

        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                policy,
                reporters: ReporterGroup::with_members(reporters),
                on_error,
                should_escalate,
                detector,
                state: Mutex::new(RecoveryState::new()),
                generation,
                disposed: AtomicBool::new(false),
                channel: Mutex::new(None),
            }),
        }
    }

    /// Captures a fault observed during producer execution.
    ///
    /// Builds a record (inferring a classification when `kind` is not
    /// supplied), stores it, invokes the error callback synchronously, and
    /// kicks off reporting followed by recovery evaluation on a background
    /// task. Returns whether the caller should re-raise the fault.
    ///
    /// Capturing on a disposed controller is a no-op.
    pub fn capture_fault(
        &self,
        fault: FaultPayload,
        trace: Option<String>,
        kind: Option<FaultKind>,
    ) -> CaptureOutcome {
        capture(&self.inner, fault, trace, kind, FaultOrigin::Producer)
    }

    /// Manually injects a fault, classified as `unknown`.
    ///
    /// This is a public alias for [`capture_fault`](Self::capture_fault)
    /// and routes through the identical reporting and recovery path.
    pub fn trigger_error(&self, fault: FaultPayload, trace: Option<String>) -> CaptureOutcome {
        capture(
            &self.inner,
            fault,
            trace,
            Some(FaultKind::Unknown),
            FaultOrigin::Producer,
        )
    }

    /// Clears the error state and counts one attempt.
    ///
    /// The producer generation is untouched, so a producer that fails
    /// deterministically will fail again immediately. Returns true if the
    /// boundary actually transitioned out of the faulted state.
    pub fn retry(&self) -> bool {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return false;
        }
        let attempt = {
            let mut state = self.inner.state.lock().unwrap();
            state.abandon_pending();
            if state.current_error.take().is_none() {
                return false;
            }
            state.attempt_count += 1;
            state.epoch += 1;
            state.attempt_count
        };
        debug!("boundary retrying (attempt {})", attempt);
        true
    }

    /// Clears the error state, zeroes the attempt counter, and advances
    /// the producer generation so the host recreates the producer.
    ///
    /// Idempotent: resetting a healthy boundary is a no-op with no
    /// generation change.
    pub fn reset(&self) -> bool {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return false;
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            state.abandon_pending();
            if state.current_error.is_none() {
                return false;
            }
            state.current_error = None;
            state.attempt_count = 0;
            state.epoch += 1;
        }
        self.inner.advance_generation();
        debug!("boundary reset; producer generation advanced");
        true
    }

    /// Returns true if the boundary currently holds a captured error.
    pub fn has_error(&self) -> bool {
        self.inner.state.lock().unwrap().current_error.is_some()
    }

    /// Returns the latest captured record, if any.
    pub fn current_error(&self) -> Option<ErrorRecord> {
        self.inner.state.lock().unwrap().current_error.clone()
    }

    /// Returns the number of retry attempts since the last reset.
    pub fn attempt_count(&self) -> u32 {
        self.inner.state.lock().unwrap().attempt_count
    }

    /// Returns true while a recovery attempt is scheduled or running.
    pub fn recovery_in_progress(&self) -> bool {
        self.inner.state.lock().unwrap().recovery_in_progress
    }

    /// Returns the current producer generation token.
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    /// Subscribes to producer generation changes.
    ///
    /// The host watches this to decide when to construct a fresh producer
    /// instance instead of re-executing the existing one.
    pub fn subscribe_generation(&self) -> watch::Receiver<u64> {
        self.inner.generation.subscribe()
    }

    /// Returns the active recovery policy.
    pub fn policy(&self) -> &RecoveryPolicy {
        &self.inner.policy
    }

    /// Returns the reporter fan-out group.
    pub fn reporters(&self) -> &ReporterGroup {
        &self.inner.reporters
    }

    /// Installs this boundary's fault sink on the given channel.
    ///
    /// Faults raised on the channel are captured through the identical
    /// path as producer faults, classified as async faults. The sink is
    /// uninstalled on disposal, restoring any handlers beneath it.
    pub fn attach_channel(&self, channel: &Arc<AsyncFaultChannel>) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handler: FaultHandler = Arc::new(move |fault, trace| match weak.upgrade() {
            Some(inner) if !inner.disposed.load(Ordering::SeqCst) => {
                capture(
                    &inner,
                    Arc::clone(fault),
                    trace.map(str::to_string),
                    None,
                    FaultOrigin::Channel,
                );
                true
            }
            _ => false,
        });
        let id = channel.install(handler);

        let mut slot = self.inner.channel.lock().unwrap();
        if let Some((old_channel, old_id)) = slot.take() {
            old_channel.uninstall(old_id);
        }
        *slot = Some((Arc::clone(channel), id));
    }

    /// Tears the boundary down.
    ///
    /// Aborts any pending scheduled recovery, uninstalls the channel sink,
    /// and turns every later operation into a no-op. Safe to call twice.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.inner.state.lock().unwrap();
            state.abandon_pending();
        }
        if let Some((channel, id)) = self.inner.channel.lock().unwrap().take() {
            channel.uninstall(id);
        }
        debug!("boundary disposed");
    }

    /// Returns true once the controller has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

/// Applies one capture transition and kicks off the async pipeline.
fn capture(
    inner: &Arc<Inner>,
    fault: FaultPayload,
    trace: Option<String>,
    kind: Option<FaultKind>,
    origin: FaultOrigin,
) -> CaptureOutcome {
    if inner.disposed.load(Ordering::SeqCst) {
        return CaptureOutcome::Ignored;
    }

    let (kind, severity) = match kind {
        Some(kind) => (kind, Severity::default()),
        None => {
            let inference = inner.detector.infer_for_origin(origin, &fault.to_string());
            (inference.kind, inference.severity)
        }
    };

    let mut record = ErrorRecord::new(Arc::clone(&fault))
        .with_kind(kind)
        .with_severity(severity);
    if let Some(trace) = trace {
        record = record.with_trace(trace);
    }

    let epoch = {
        let mut state = inner.state.lock().unwrap();
        // A pending recovery was scheduled for a fault that is no longer
        // current; the pipeline for this capture owns recovery now.
        state.abandon_pending();
        state.epoch += 1;
        state.current_error = Some(record.clone());
        state.epoch
    };

    debug!(
        kind = kind.as_str(),
        severity = severity.as_str(),
        "captured fault: {}",
        record.message()
    );

    if let Some(on_error) = &inner.on_error {
        on_error(&record);
    }

    let pipeline_inner = Arc::clone(inner);
    tokio::spawn(async move {
        // Reporting completes before recovery evaluation begins.
        pipeline_inner.reporters.dispatch(&record).await;
        schedule_recovery(&pipeline_inner, epoch);
    });

    let escalate = inner
        .should_escalate
        .as_ref()
        .map_or(false, |predicate| predicate(&fault));
    if escalate {
        CaptureOutcome::Escalated(fault)
    } else {
        CaptureOutcome::Contained
    }
}

enum RecoveryAction {
    Retry { attempt: u32, delay: Duration },
    Reset,
    Custom(RecoverFn),
}

enum RecoveryOutcome {
    Retry,
    Reset,
    Abandon,
}

/// Evaluates the policy for the capture stamped with `epoch` and, when it
/// calls for action, spawns the delayed recovery task.
fn schedule_recovery(inner: &Arc<Inner>, epoch: u64) {
    let action = {
        let mut state = inner.state.lock().unwrap();
        if inner.disposed.load(Ordering::SeqCst)
            || state.epoch != epoch
            || state.current_error.is_none()
            || state.recovery_in_progress
        {
            return;
        }
        match &inner.policy {
            RecoveryPolicy::None => return,
            RecoveryPolicy::Retry {
                max_attempts,
                base_delay,
                use_backoff,
            } => {
                if state.attempt_count >= *max_attempts {
                    warn!(
                        "retry attempts exhausted ({}/{}); boundary stays faulted",
                        state.attempt_count, max_attempts
                    );
                    return;
                }
                let attempt = state.attempt_count + 1;
                let delay = backoff_delay(*base_delay, *use_backoff, attempt);
                state.recovery_in_progress = true;
                RecoveryAction::Retry { attempt, delay }
            }
            RecoveryPolicy::Reset => {
                state.recovery_in_progress = true;
                RecoveryAction::Reset
            }
            RecoveryPolicy::Custom { recover } => {
                state.recovery_in_progress = true;
                RecoveryAction::Custom(Arc::clone(recover))
            }
        }
    };

    let task_inner = Arc::clone(inner);
    let handle = tokio::spawn(async move {
        run_recovery(task_inner, epoch, action).await;
    });

    let mut state = inner.state.lock().unwrap();
    if state.epoch != epoch {
        // A competing transition ran while the task was being spawned;
        // whatever state owns recovery now, it is not this capture.
        handle.abort();
        return;
    }
    state.recovery_task = Some(handle);
}

async fn run_recovery(inner: Arc<Inner>, epoch: u64, action: RecoveryAction) {
    match action {
        RecoveryAction::Retry { attempt, delay } => {
            debug!("scheduling retry attempt {} in {:?}", attempt, delay);
            sleep(delay).await;
            finish_recovery(&inner, epoch, RecoveryOutcome::Retry);
        }
        RecoveryAction::Reset => {
            sleep(RESET_SETTLE_DELAY).await;
            finish_recovery(&inner, epoch, RecoveryOutcome::Reset);
        }
        RecoveryAction::Custom(recover) => {
            // A panicking recovery function counts as a failed recovery.
            let recovered = AssertUnwindSafe(recover())
                .catch_unwind()
                .await
                .unwrap_or(false);
            let outcome = if recovered {
                RecoveryOutcome::Retry
            } else {
                debug!("custom recovery declined; boundary stays faulted");
                RecoveryOutcome::Abandon
            };
            finish_recovery(&inner, epoch, outcome);
        }
    }
}

/// Applies the result of a recovery attempt, unless the originating
/// faulted state is no longer current.
fn finish_recovery(inner: &Arc<Inner>, epoch: u64, outcome: RecoveryOutcome) {
    let advanced_generation = {
        let mut state = inner.state.lock().unwrap();
        if inner.disposed.load(Ordering::SeqCst) || state.epoch != epoch {
            // Stale: a manual transition or newer capture raced ahead.
            return;
        }
        state.recovery_in_progress = false;
        state.recovery_task = None;
        match outcome {
            RecoveryOutcome::Retry => {
                if state.current_error.take().is_some() {
                    state.attempt_count += 1;
                    state.epoch += 1;
                }
                false
            }
            RecoveryOutcome::Reset => {
                state.current_error = None;
                state.attempt_count = 0;
                state.epoch += 1;
                true
            }
            RecoveryOutcome::Abandon => false,
        }
    };
    if advanced_generation {
        inner.advance_generation();
        debug!("scheduled reset applied; producer generation advanced");
    }
}
