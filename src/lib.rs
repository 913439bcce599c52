//! Reactive state containers with serialized mutation and lifecycle-aware
//! subscriptions.
//!
//! A [`ViewModel`] owns one immutable [`State`] value inside a store that
//! serializes every mutation through a single writer. Reducers are pure
//! functions from old state to new state; async work is projected into the
//! state as [`Async`] values; subscribers receive committed states through
//! projection-deduplicated, lifecycle-gated streams.
//!
//! ```text
//!   set_state ─┐                       ┌─> on_each / on_each1..7
//!              ├─> [writer task] ──────┼─> on_async
//!   execute ───┘    one commit         └─> stream()
//!                   at a time
//! ```
//!
//! Test setups swap the store implementation via [`MockBehavior`]: a
//! scriptable store ignores reducers and is driven by
//! [`ViewModel::force_next`]; a synchronous store applies every call before
//! returning.

mod async_value;
mod job;
mod lifecycle;
mod mock;
mod purity;
mod state;
mod store;
mod subscribe;
mod view_model;

pub use async_value::{Async, Metadata, OperationError};
pub use job::JobHandle;
pub use lifecycle::{LifecycleDestroyed, LifecycleHandle, LifecycleOwner, LifecycleState};
pub use mock::{
    with_behavior, BehaviorGuard, BlockExecutions, InitialStateMocking, MockBehavior,
    MockBehaviorStack, StoreBehavior, StoreConfig,
};
pub use purity::PurityViolation;
pub use state::{FieldValue, State};
pub use store::{
    MockableStateStore, ScriptableStateStore, SerializedStateStore, StateReader, StateReducer,
    StateStore, StateStream, SynchronousStateStore,
};
pub use subscribe::DeliveryMode;
pub use view_model::{RetainFn, StoreError, ViewModel};
