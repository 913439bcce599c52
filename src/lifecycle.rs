//! Lifecycle signaling between a host surface and its subscriptions.
//!
//! A host (a screen, a connection, a test harness) owns a [`LifecycleOwner`]
//! and flips it between active and inactive as its visibility changes;
//! subscriptions hold cheap [`LifecycleHandle`] clones and gate delivery on
//! the observed phase. Destruction is terminal and fans out to every handle.

use thiserror::Error;
use tokio::sync::watch;

/// Phase of a host surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed or backgrounded; deliveries are held.
    Inactive,
    /// Visible; deliveries flow.
    Active,
    /// Torn down. Terminal.
    Destroyed,
}

/// Error returned by handle waits once the owner is destroyed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("lifecycle destroyed")]
pub struct LifecycleDestroyed;

/// The writing side of a lifecycle. Dropping it destroys the lifecycle.
pub struct LifecycleOwner {
    tx: watch::Sender<LifecycleState>,
}

impl LifecycleOwner {
    /// A lifecycle starting out inactive.
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(LifecycleState::Inactive),
        }
    }

    /// A lifecycle starting out active.
    pub fn started() -> Self {
        Self {
            tx: watch::Sender::new(LifecycleState::Active),
        }
    }

    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Flip between active and inactive. No-op after destruction.
    pub fn set_active(&self, active: bool) {
        let target = if active {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        };
        self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Destroyed || *state == target {
                false
            } else {
                *state = target;
                true
            }
        });
    }

    /// Destroy the lifecycle. Idempotent and terminal.
    pub fn destroy(&self) {
        self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Destroyed {
                false
            } else {
                *state = LifecycleState::Destroyed;
                true
            }
        });
    }
}

impl Default for LifecycleOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleOwner {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Read side of a lifecycle. Cheap to clone; every clone observes the same
/// phase changes.
#[derive(Clone)]
pub struct LifecycleHandle {
    rx: watch::Receiver<LifecycleState>,
}

impl LifecycleHandle {
    pub fn current(&self) -> LifecycleState {
        *self.rx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.current() == LifecycleState::Active
    }

    /// Wait for the next phase change and return the new phase.
    pub async fn changed(&mut self) -> Result<LifecycleState, LifecycleDestroyed> {
        // The owner destroys on drop, so a closed channel and an observed
        // Destroyed are the same condition.
        if self.rx.changed().await.is_err() {
            return Err(LifecycleDestroyed);
        }
        let state = *self.rx.borrow_and_update();
        if state == LifecycleState::Destroyed {
            Err(LifecycleDestroyed)
        } else {
            Ok(state)
        }
    }

    /// Resolve once the phase is `Active`.
    pub async fn wait_active(&mut self) -> Result<(), LifecycleDestroyed> {
        match self
            .rx
            .wait_for(|state| *state != LifecycleState::Inactive)
            .await
        {
            Ok(state) if *state == LifecycleState::Active => Ok(()),
            _ => Err(LifecycleDestroyed),
        }
    }

    /// Resolve once the lifecycle is destroyed.
    pub async fn destroyed(&mut self) {
        let _ = self
            .rx
            .wait_for(|state| *state == LifecycleState::Destroyed)
            .await;
    }
}
