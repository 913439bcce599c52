//! Store variant that applies and publishes every call before returning.
//!
//! There is no internal queue and no writer task, so test code can call
//! `set_state` and assert on `state()` on the next line. Subscriber channels
//! are unbounded: with no concurrency there is nothing to buffer against.

use parking_lot::RwLock;

use crate::state::State;

use super::subscribers::{StateStream, Subscribers};
use super::{StateReader, StateReducer, StateStore};

pub struct SynchronousStateStore<S: State> {
    current: RwLock<S>,
    subscribers: Subscribers<S>,
}

impl<S: State> SynchronousStateStore<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: RwLock::new(initial),
            subscribers: Subscribers::new(),
        }
    }

    /// Overwrite the current state and publish it. Used when a mockable
    /// router carries state across a behavior switch.
    pub(crate) fn mirror(&self, state: S) {
        self.subscribers.publish_now(|| {
            *self.current.write() = state.clone();
            state
        });
    }
}

impl<S: State> StateStore<S> for SynchronousStateStore<S> {
    fn state(&self) -> S {
        self.current.read().clone()
    }

    fn with_state(&self, read: StateReader<S>) {
        read(self.state());
    }

    fn set_state(&self, reducer: StateReducer<S>) {
        // The registry lock serializes concurrent callers and keeps the
        // commit atomic with subscriber attachment.
        self.subscribers.publish_now(|| {
            let mut current = self.current.write();
            let next = reducer(current.clone());
            *current = next.clone();
            next
        });
    }

    fn subscribe(&self) -> StateStream<S> {
        self.subscribers.attach_direct(|| self.state())
    }
}
