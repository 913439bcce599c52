//! State stores: serialized owners of one state value and its mutation queue.
//!
//! A store holds the current immutable state and accepts mutation requests
//! from any task. The normal implementation ([`SerializedStateStore`])
//! serializes all work through a single writer; the other variants exist for
//! deterministic testing and tooling and are routed to by
//! [`MockableStateStore`].

mod mockable;
mod scriptable;
mod serialized;
mod subscribers;
mod synchronous;

pub use mockable::MockableStateStore;
pub use scriptable::ScriptableStateStore;
pub use serialized::SerializedStateStore;
pub use subscribers::StateStream;
pub use synchronous::SynchronousStateStore;

use crate::state::State;

/// A queued state mutation: pure function from old state to new state.
pub type StateReducer<S> = Box<dyn FnOnce(S) -> S + Send>;

/// A queued state read, run after all previously enqueued mutations commit.
pub type StateReader<S> = Box<dyn FnOnce(S) + Send>;

/// Serialized owner of one state value.
pub trait StateStore<S: State>: Send + Sync {
    /// The latest committed state. Never blocks, never queues.
    fn state(&self) -> S;

    /// Enqueue a read. It runs after every mutation enqueued strictly before
    /// it and before any mutation enqueued strictly after it.
    fn with_state(&self, read: StateReader<S>);

    /// Enqueue a mutation. The reducer is invoked with the state resulting
    /// from all previously enqueued mutations; its output becomes the new
    /// current state and is published to subscribers.
    fn set_state(&self, reducer: StateReducer<S>);

    /// Subscribe to the snapshot stream: the current state first, then one
    /// emission per commit in commit order. No history for late subscribers.
    fn subscribe(&self) -> StateStream<S>;
}
