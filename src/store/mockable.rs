//! Router delegating each store call to a behavior-selected variant.
//!
//! One of these fronts a serialized, a scriptable, and a synchronous store
//! holding the same state. Every call consults the config's effective
//! behavior, so pushing a behavior override redirects live view models
//! without rebuilding them. When routing switches variant, the previously
//! routed variant's state carries over so no committed state is lost.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::mock::{StoreBehavior, StoreConfig};
use crate::state::State;

use super::scriptable::ScriptableStateStore;
use super::serialized::SerializedStateStore;
use super::subscribers::StateStream;
use super::synchronous::SynchronousStateStore;
use super::{StateReader, StateReducer, StateStore};

pub struct MockableStateStore<S: State> {
    serialized: Arc<SerializedStateStore<S>>,
    scriptable: Arc<ScriptableStateStore<S>>,
    synchronous: Arc<SynchronousStateStore<S>>,
    config: Arc<StoreConfig>,
    last_behavior: Mutex<StoreBehavior>,
}

impl<S: State> MockableStateStore<S> {
    /// Build the router and all three variants. Must be called from within a
    /// tokio runtime.
    pub fn new(initial: S, config: Arc<StoreConfig>) -> Self {
        let serialized = Arc::new(SerializedStateStore::new(initial.clone()));
        let scriptable = Arc::new(ScriptableStateStore::new(initial.clone()));
        let synchronous = Arc::new(SynchronousStateStore::new(initial));

        // Normal-mode commits flow into the passive variants so a later
        // behavior switch starts from the latest state.
        let mut commits = serialized.subscribe();
        let forward_scriptable = Arc::clone(&scriptable);
        let forward_synchronous = Arc::clone(&synchronous);
        tokio::spawn(async move {
            while let Some(state) = commits.next().await {
                if forward_scriptable.state() != state {
                    forward_scriptable.next(state.clone());
                }
                if forward_synchronous.state() != state {
                    forward_synchronous.mirror(state);
                }
            }
        });

        let last_behavior = Mutex::new(config.store_behavior());
        Self {
            serialized,
            scriptable,
            synchronous,
            config,
            last_behavior,
        }
    }

    /// Inject the next state directly. Only valid while routed scriptable.
    ///
    /// # Panics
    ///
    /// Panics if the effective store behavior is not
    /// [`StoreBehavior::Scriptable`].
    pub fn force_next(&self, state: S) {
        let behavior = self.config.store_behavior();
        assert!(
            behavior == StoreBehavior::Scriptable,
            "force_next requires scriptable store behavior (current: {behavior:?})"
        );
        self.route();
        self.scriptable.next(state.clone());
        self.serialized.mirror(state.clone());
        self.synchronous.mirror(state);
    }

    /// Resolve the active variant, carrying state forward on a switch.
    fn route(&self) -> Arc<dyn StateStore<S>> {
        let behavior = self.config.store_behavior();
        let mut last = self.last_behavior.lock();
        if *last != behavior {
            let current = self.variant(*last).state();
            let target = self.variant(behavior);
            if target.state() != current {
                match behavior {
                    StoreBehavior::Normal => self.serialized.mirror(current),
                    StoreBehavior::Scriptable => self.scriptable.next(current),
                    StoreBehavior::Synchronous => self.synchronous.mirror(current),
                }
            }
            tracing::debug!(from = ?*last, to = ?behavior, "store behavior switched");
            *last = behavior;
        }
        self.variant(behavior)
    }

    fn variant(&self, behavior: StoreBehavior) -> Arc<dyn StateStore<S>> {
        match behavior {
            StoreBehavior::Normal => Arc::clone(&self.serialized) as Arc<dyn StateStore<S>>,
            StoreBehavior::Scriptable => Arc::clone(&self.scriptable) as Arc<dyn StateStore<S>>,
            StoreBehavior::Synchronous => Arc::clone(&self.synchronous) as Arc<dyn StateStore<S>>,
        }
    }
}

impl<S: State> StateStore<S> for MockableStateStore<S> {
    fn state(&self) -> S {
        self.route().state()
    }

    fn with_state(&self, read: StateReader<S>) {
        self.route().with_state(read);
    }

    fn set_state(&self, reducer: StateReducer<S>) {
        self.route().set_state(reducer);
    }

    fn subscribe(&self) -> StateStream<S> {
        self.route().subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockBehaviorStack};

    #[derive(Clone, PartialEq, Debug)]
    struct Counter {
        count: i64,
    }

    impl State for Counter {}

    fn mocked_config(stack: &Arc<MockBehaviorStack>) -> Arc<StoreConfig> {
        Arc::new(StoreConfig::new(
            true,
            Arc::clone(stack),
            Some(MockBehavior::default()),
        ))
    }

    #[tokio::test]
    async fn synchronous_override_applies_inline() {
        let stack = MockBehaviorStack::new();
        let store = MockableStateStore::new(Counter { count: 0 }, mocked_config(&stack));

        let _guard = stack.push(MockBehavior::synchronous());
        store.set_state(Box::new(|s| Counter { count: s.count + 1 }));
        assert_eq!(store.state().count, 1);
    }

    #[tokio::test]
    async fn behavior_switch_carries_state() {
        let stack = MockBehaviorStack::new();
        let store = MockableStateStore::new(Counter { count: 0 }, mocked_config(&stack));

        let sync_guard = stack.push(MockBehavior::synchronous());
        store.set_state(Box::new(|s| Counter { count: s.count + 7 }));
        assert_eq!(store.state().count, 7);
        drop(sync_guard);

        // Switch again; the synchronous commit survived.
        let _guard = stack.push(MockBehavior::scriptable());
        assert_eq!(store.state().count, 7);
    }

    #[tokio::test]
    #[should_panic(expected = "force_next requires scriptable")]
    async fn force_next_outside_scriptable_panics() {
        let stack = MockBehaviorStack::new();
        let store = MockableStateStore::new(Counter { count: 0 }, mocked_config(&stack));
        store.force_next(Counter { count: 1 });
    }
}
