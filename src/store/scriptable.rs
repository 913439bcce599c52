//! Store variant scripted via direct state injection.
//!
//! Standard mutations are ignored; tests and tooling drive the state with
//! [`ScriptableStateStore::next`] instead. Useful for pinning a screen to an
//! exact state without running any business logic.

use parking_lot::RwLock;

use crate::state::State;

use super::subscribers::{StateStream, Subscribers};
use super::{StateReader, StateReducer, StateStore};

pub struct ScriptableStateStore<S: State> {
    current: RwLock<S>,
    subscribers: Subscribers<S>,
}

impl<S: State> ScriptableStateStore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: RwLock::new(initial),
            subscribers: Subscribers::new(),
        }
    }

    /// Set the next state directly and publish it.
    pub fn next(&self, state: S) {
        self.subscribers.publish_now(|| {
            *self.current.write() = state.clone();
            state
        });
    }
}

impl<S: State> StateStore<S> for ScriptableStateStore<S> {
    fn state(&self) -> S {
        self.current.read().clone()
    }

    fn with_state(&self, read: StateReader<S>) {
        read(self.state());
    }

    fn set_state(&self, _reducer: StateReducer<S>) {
        // Scripted stores ignore reducers; drive state via `next`.
        tracing::trace!("reducer ignored (scriptable store)");
    }

    fn subscribe(&self) -> StateStream<S> {
        self.subscribers.attach_direct(|| self.state())
    }
}
