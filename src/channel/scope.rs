//! Scoped task spawning with fault funneling.

use std::sync::Mutex;

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::boundary::BoundaryController;
use crate::record::{text_fault, FaultKind};

/// Spawns tasks whose unhandled failures are funneled into a boundary.
///
/// Any task spawned through the scope that returns an error or panics is
/// captured by the owning controller, classified as an async fault, through
/// the same path as every other fault. Tasks still running when
/// [`FaultScope::shutdown`] is called are aborted.
pub struct FaultScope {
    controller: BoundaryController,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FaultScope {
    /// Creates a scope funneling failures into the given controller.
    pub fn new(controller: BoundaryController) -> Self {
        Self {
            controller,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns a fallible task inside the scope.
    ///
    /// An `Err` return or a panic is captured as an async fault on the
    /// owning boundary; a clean `Ok(())` completion is invisible.
    pub fn spawn<F, E>(&self, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let controller = self.controller.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    controller.capture_fault(Arc::new(err), None, Some(FaultKind::AsyncFault));
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    controller.capture_fault(
                        text_fault(message),
                        None,
                        Some(FaultKind::AsyncFault),
                    );
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Returns the number of tasks still running.
    pub fn active_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|h| !h.is_finished());
        tasks.len()
    }

    /// Aborts every task still running in the scope.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("task panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("task panicked: {}", message)
    } else {
        "task panicked".to_string()
    }
}
