//! The normal store implementation: one writer task drains a FIFO queue.
//!
//! Producers enqueue mutations and reads from any task and return
//! immediately; a dedicated writer applies them one at a time in enqueue
//! order, giving strict single-writer ordering without locking every call.
//! Mutations and reads share one queue, so a queued read observes exactly
//! the mutations enqueued before it.

use std::any::Any;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::purity::PurityViolation;
use crate::state::State;

use super::subscribers::{StateStream, Subscribers};
use super::{StateReader, StateReducer, StateStore};

enum StoreOperation<S> {
    Mutate(StateReducer<S>),
    Read(StateReader<S>),
}

pub struct SerializedStateStore<S: State> {
    shared: Arc<Shared<S>>,
    op_tx: mpsc::UnboundedSender<StoreOperation<S>>,
}

struct Shared<S> {
    id: Uuid,
    current: RwLock<S>,
    subscribers: Subscribers<S>,
}

impl<S: State> SerializedStateStore<S> {
    /// Create the store and spawn its writer task. Must be called from
    /// within a tokio runtime.
    pub fn new(initial: S) -> Self {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            current: RwLock::new(initial),
            subscribers: Subscribers::new(),
        });
        tracing::debug!(store_id = %shared.id, "state store writer starting");
        tokio::spawn(run_writer(Arc::clone(&shared), op_rx));
        Self { shared, op_tx }
    }

    /// Overwrite the current state immediately and republish it through the
    /// writer so subscribers observe it in commit order. Used when a mockable
    /// router carries state across a behavior switch.
    pub(crate) fn mirror(&self, state: S) {
        *self.shared.current.write() = state.clone();
        self.set_state(Box::new(move |_| state));
    }

    fn enqueue(&self, op: StoreOperation<S>) {
        if self.op_tx.send(op).is_err() {
            tracing::trace!(store_id = %self.shared.id, "operation dropped (writer stopped)");
        }
    }
}

impl<S: State> StateStore<S> for SerializedStateStore<S> {
    fn state(&self) -> S {
        self.shared.current.read().clone()
    }

    fn with_state(&self, read: StateReader<S>) {
        self.enqueue(StoreOperation::Read(read));
    }

    fn set_state(&self, reducer: StateReducer<S>) {
        self.enqueue(StoreOperation::Mutate(reducer));
    }

    fn subscribe(&self) -> StateStream<S> {
        self.shared
            .subscribers
            .attach_queued(|| self.shared.current.read().clone())
    }
}

async fn run_writer<S: State>(
    shared: Arc<Shared<S>>,
    mut op_rx: mpsc::UnboundedReceiver<StoreOperation<S>>,
) {
    while let Some(op) = op_rx.recv().await {
        match op {
            StoreOperation::Mutate(reducer) => apply(&shared, reducer).await,
            StoreOperation::Read(read) => {
                let snapshot = shared.current.read().clone();
                read(snapshot);
            }
        }
    }
    tracing::debug!(store_id = %shared.id, "state store writer stopped");
}

async fn apply<S: State>(shared: &Arc<Shared<S>>, reducer: StateReducer<S>) {
    let previous = shared.current.read().clone();
    // Commits are all-or-nothing: a panicking reducer leaves the state
    // untouched and must not take the queue down with it.
    let next = match catch_unwind(AssertUnwindSafe(move || reducer(previous))) {
        Ok(next) => next,
        Err(payload) => {
            tracing::error!(
                store_id = %shared.id,
                panic = panic_message(payload.as_ref()),
                "reducer panicked; mutation dropped"
            );
            if payload.is::<PurityViolation>() {
                // Impure reducers are a programmer error; fail fast.
                resume_unwind(payload);
            }
            return;
        }
    };
    shared
        .subscribers
        .publish(&next, || *shared.current.write() = next.clone())
        .await;
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(violation) = payload.downcast_ref::<PurityViolation>() {
        &violation.message
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Counter {
        count: i64,
    }

    impl State for Counter {}

    #[tokio::test]
    async fn mutations_apply_in_enqueue_order() {
        let store = SerializedStateStore::new(Counter { count: 0 });
        store.set_state(Box::new(|s| Counter { count: s.count + 1 }));
        store.set_state(Box::new(|s| Counter { count: s.count * 10 }));

        let (tx, rx) = tokio::sync::oneshot::channel();
        store.with_state(Box::new(move |s| {
            let _ = tx.send(s);
        }));
        assert_eq!(rx.await.unwrap().count, 10);
    }

    #[tokio::test]
    async fn queued_read_runs_before_later_mutations() {
        let store = SerializedStateStore::new(Counter { count: 0 });
        store.set_state(Box::new(|s| Counter { count: s.count + 1 }));

        let (tx, rx) = tokio::sync::oneshot::channel();
        store.with_state(Box::new(move |s| {
            let _ = tx.send(s.count);
        }));
        store.set_state(Box::new(|s| Counter { count: s.count + 100 }));

        // The read holds its queue position: it sees the +1 but not the +100
        // enqueued after it.
        assert_eq!(rx.await.unwrap(), 1);

        let (tx, rx) = tokio::sync::oneshot::channel();
        store.with_state(Box::new(move |s| {
            let _ = tx.send(s.count);
        }));
        assert_eq!(rx.await.unwrap(), 101);
    }

    #[tokio::test]
    async fn panicking_reducer_does_not_stop_the_queue() {
        let store = SerializedStateStore::new(Counter { count: 0 });
        store.set_state(Box::new(|_| panic!("broken reducer")));
        store.set_state(Box::new(|s| Counter { count: s.count + 5 }));

        let (tx, rx) = tokio::sync::oneshot::channel();
        store.with_state(Box::new(move |s| {
            let _ = tx.send(s);
        }));
        assert_eq!(rx.await.unwrap().count, 5);
    }

    #[tokio::test]
    async fn subscriber_starts_with_current_state() {
        let store = SerializedStateStore::new(Counter { count: 3 });
        let mut stream = store.subscribe();
        assert_eq!(stream.next().await, Some(Counter { count: 3 }));
    }
}
