//! Handle to a spawned background task.

use std::panic::resume_unwind;

use tokio::task::JoinHandle;

/// Owns a spawned task; allows cancelling it or awaiting its completion.
/// Dropping the handle detaches the task.
#[derive(Debug)]
pub struct JobHandle {
    handle: JoinHandle<()>,
}

impl JobHandle {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Cancel the task at its next await point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to finish. Propagates the task's panic, if any;
    /// cancellation resolves normally.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                resume_unwind(err.into_panic());
            }
        }
    }
}
