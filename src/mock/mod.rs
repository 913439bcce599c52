//! Scriptable configuration for tests and tooling.
//!
//! A [`MockBehavior`] selects how a view model's store behaves: how initial
//! state is seeded, whether async executions are suppressed, and which store
//! implementation backs reads and writes. Behaviors are layered on an
//! explicit, lock-protected [`MockBehaviorStack`] shared by reference into
//! store construction rather than ambient process state. Pushed overrides
//! are popped structurally by a guard so nested test scenarios compose.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::state::State;

/// How a mocked initial state seeds a new view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialStateMocking {
    /// No mocked state; the view model initializes itself normally.
    #[default]
    None,
    /// The mocked state seeds construction but later reducers run normally.
    Partial,
    /// The mocked state seeds construction and is re-forced afterwards, so
    /// initialization-time reducers cannot diverge from it.
    Full,
}

/// Whether async-adapter executions are suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockExecutions {
    #[default]
    No,
    /// Commit nothing; the underlying computation never runs.
    Completely,
    /// Commit one `Loading` state, then behave like [`Self::Completely`].
    /// Freezes a screen in a deterministic "still loading" visual.
    WithLoading,
}

/// Which store implementation backs reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBehavior {
    /// The normal serialized store.
    #[default]
    Normal,
    /// Reducers are ignored; state is driven by `force_next`.
    Scriptable,
    /// Every call applies and publishes before returning.
    Synchronous,
}

/// One mock setup: initial-state seeding, execution blocking, store routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockBehavior {
    pub initial_state: InitialStateMocking,
    pub block_executions: BlockExecutions,
    pub store_behavior: StoreBehavior,
}

impl MockBehavior {
    pub fn scriptable() -> Self {
        Self {
            store_behavior: StoreBehavior::Scriptable,
            ..Self::default()
        }
    }

    pub fn synchronous() -> Self {
        Self {
            store_behavior: StoreBehavior::Synchronous,
            ..Self::default()
        }
    }
}

/// Lock-protected stack of behavior overrides.
///
/// The top of the stack wins over a view model's base behavior. `push`
/// returns a [`BehaviorGuard`] whose drop pops, so push/pop pairing is
/// guaranteed even on unwind; releasing guards out of order is a programmer
/// error and fails loudly.
#[derive(Default)]
pub struct MockBehaviorStack {
    overrides: Mutex<Vec<(u64, MockBehavior)>>,
    next_token: AtomicU64,
}

impl MockBehaviorStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Push an override onto the stack. Live view models constructed against
    /// this stack route through the new behavior immediately.
    pub fn push(self: &Arc<Self>, behavior: MockBehavior) -> BehaviorGuard {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.overrides.lock().push((token, behavior));
        tracing::debug!(?behavior, "mock behavior pushed");
        BehaviorGuard {
            stack: Arc::clone(self),
            token,
        }
    }

    /// The topmost override, if any.
    pub fn current(&self) -> Option<MockBehavior> {
        self.overrides.lock().last().map(|(_, behavior)| *behavior)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.lock().is_empty()
    }

    fn pop(&self, token: u64) {
        let mut overrides = self.overrides.lock();
        match overrides.last() {
            Some((top, _)) if *top == token => {
                overrides.pop();
                tracing::debug!("mock behavior popped");
            }
            _ => {
                drop(overrides);
                // A second panic while unwinding would abort; report instead.
                if std::thread::panicking() {
                    tracing::error!("mock behavior guards released out of order during unwind");
                } else {
                    panic!("mock behavior guards released out of order (push/pop must nest)");
                }
            }
        }
    }
}

/// Pops its behavior override when dropped.
#[must_use = "dropping the guard pops the behavior override"]
pub struct BehaviorGuard {
    stack: Arc<MockBehaviorStack>,
    token: u64,
}

impl Drop for BehaviorGuard {
    fn drop(&mut self) {
        self.stack.pop(self.token);
    }
}

/// Run `f` with `behavior` pushed; the override pops when `f` returns or
/// unwinds.
pub fn with_behavior<R>(
    stack: &Arc<MockBehaviorStack>,
    behavior: MockBehavior,
    f: impl FnOnce() -> R,
) -> R {
    let _guard = stack.push(behavior);
    f()
}

/// Per-view-model configuration resolved at each store call.
///
/// `debug_mode` gates both the reducer purity guard and all mocking; in
/// production builds behaviors are ignored entirely.
pub struct StoreConfig {
    pub debug_mode: bool,
    behavior_stack: Arc<MockBehaviorStack>,
    base_behavior: Option<MockBehavior>,
}

impl StoreConfig {
    pub fn new(
        debug_mode: bool,
        behavior_stack: Arc<MockBehaviorStack>,
        base_behavior: Option<MockBehavior>,
    ) -> Self {
        if !debug_mode && base_behavior.is_some() {
            tracing::error!("mock behavior configured outside debug mode; ignoring");
        }
        Self {
            debug_mode,
            behavior_stack,
            base_behavior,
        }
    }

    /// Production defaults: no purity guard, no mocking.
    pub fn production() -> Self {
        Self::new(false, MockBehaviorStack::new(), None)
    }

    /// Debug defaults: purity guard on, no mocking.
    pub fn debug() -> Self {
        Self::new(true, MockBehaviorStack::new(), None)
    }

    /// Debug with a base mock behavior on a fresh stack.
    pub fn mocked(behavior: MockBehavior) -> Self {
        Self::new(true, MockBehaviorStack::new(), Some(behavior))
    }

    pub fn behavior_stack(&self) -> &Arc<MockBehaviorStack> {
        &self.behavior_stack
    }

    /// The effective behavior: topmost stack override, else the base.
    /// Always `None` outside debug mode.
    pub fn behavior(&self) -> Option<MockBehavior> {
        if !self.debug_mode {
            return None;
        }
        self.behavior_stack.current().or(self.base_behavior)
    }

    pub fn store_behavior(&self) -> StoreBehavior {
        self.behavior()
            .map(|b| b.store_behavior)
            .unwrap_or_default()
    }

    pub fn block_executions(&self) -> BlockExecutions {
        self.behavior()
            .map(|b| b.block_executions)
            .unwrap_or_default()
    }

    pub fn initial_state_mocking(&self) -> InitialStateMocking {
        self.behavior().map(|b| b.initial_state).unwrap_or_default()
    }

    /// Whether view models built from this config get a mockable store.
    /// Fixed at construction: a base behavior or a live override must be
    /// present when the view model is created.
    pub fn mocking_enabled(&self) -> bool {
        self.debug_mode && (self.base_behavior.is_some() || !self.behavior_stack.is_empty())
    }

    /// Choose the initial state per the seeding policy.
    pub(crate) fn resolve_initial<S: State>(&self, natural: S, mocked: Option<S>) -> S {
        match (self.initial_state_mocking(), mocked) {
            (InitialStateMocking::Partial | InitialStateMocking::Full, Some(mocked)) => mocked,
            _ => natural,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_overrides_nest() {
        let stack = MockBehaviorStack::new();
        assert_eq!(stack.current(), None);

        let outer = stack.push(MockBehavior::synchronous());
        assert_eq!(
            stack.current().unwrap().store_behavior,
            StoreBehavior::Synchronous
        );

        {
            let _inner = stack.push(MockBehavior::scriptable());
            assert_eq!(
                stack.current().unwrap().store_behavior,
                StoreBehavior::Scriptable
            );
        }

        assert_eq!(
            stack.current().unwrap().store_behavior,
            StoreBehavior::Synchronous
        );
        drop(outer);
        assert_eq!(stack.current(), None);
    }

    #[test]
    #[should_panic(expected = "released out of order")]
    fn out_of_order_release_panics() {
        let stack = MockBehaviorStack::new();
        let first = stack.push(MockBehavior::default());
        let second = stack.push(MockBehavior::scriptable());
        drop(first);
        drop(second);
    }

    #[test]
    fn with_behavior_pops_on_unwind() {
        let stack = MockBehaviorStack::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_behavior(&stack, MockBehavior::scriptable(), || panic!("inner"))
        }));
        assert!(result.is_err());
        assert_eq!(stack.current(), None);
    }

    #[test]
    fn behavior_ignored_outside_debug() {
        let config = StoreConfig::new(
            false,
            MockBehaviorStack::new(),
            Some(MockBehavior::scriptable()),
        );
        assert_eq!(config.behavior(), None);
        assert_eq!(config.store_behavior(), StoreBehavior::Normal);
        assert!(!config.mocking_enabled());
    }

    #[test]
    fn stack_override_beats_base() {
        let stack = MockBehaviorStack::new();
        let config = StoreConfig::new(true, Arc::clone(&stack), Some(MockBehavior::synchronous()));
        assert_eq!(config.store_behavior(), StoreBehavior::Synchronous);

        let _guard = stack.push(MockBehavior::scriptable());
        assert_eq!(config.store_behavior(), StoreBehavior::Scriptable);
    }
}
