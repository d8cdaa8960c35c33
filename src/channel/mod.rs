//! Async-fault channel.
//!
//! Faults that occur outside the producer's normal synchronous execution
//! path (detached background tasks, host-level hooks) arrive through this
//! channel. Handlers form a stack dispatched most-recent-first: installing
//! a handler never displaces the ones below it, and uninstalling restores
//! them exactly as they were, so a boundary can come and go without
//! permanently stealing faults that are not its own.

mod scope;

pub use scope::FaultScope;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::record::FaultPayload;

/// A handler installed on the channel.
///
/// Receives the fault and optional trace; returns `true` to claim the
/// fault, stopping dispatch, or `false` to let it fall through to the
/// next handler down the stack.
pub type FaultHandler = Arc<dyn Fn(&FaultPayload, Option<&str>) -> bool + Send + Sync>;

/// Identifies an installed handler for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A stack of fault handlers shared between the host and its boundaries.
pub struct AsyncFaultChannel {
    entries: Mutex<Vec<(HandlerId, FaultHandler)>>,
    next_id: AtomicU64,
}

impl AsyncFaultChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Pushes a handler onto the stack.
    ///
    /// The handler sees faults before every handler installed earlier.
    pub fn install(&self, handler: FaultHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries.lock().unwrap().push((id, handler));
        id
    }

    /// Removes a handler, restoring the stack beneath it.
    ///
    /// Returns true if the handler was still installed.
    pub fn uninstall(&self, id: HandlerId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Returns the number of installed handlers.
    pub fn handler_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Raises a fault through the stack.
    ///
    /// Handlers run most-recent-first until one claims the fault. Returns
    /// true if any handler claimed it; the host applies its own default
    /// handling on false.
    pub fn raise(&self, fault: &FaultPayload, trace: Option<&str>) -> bool {
        // Snapshot under the lock so handlers run without holding it and
        // may themselves install or uninstall.
        let handlers: Vec<FaultHandler> = {
            let entries = self.entries.lock().unwrap();
            entries.iter().rev().map(|(_, h)| Arc::clone(h)).collect()
        };

        handlers.iter().any(|handler| handler(fault, trace))
    }
}

impl Default for AsyncFaultChannel {
    fn default() -> Self {
        Self::new()
    }
}
