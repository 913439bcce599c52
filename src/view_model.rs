//! View models: state owners tying stores, async execution, and
//! subscriptions together.
//!
//! A [`ViewModel`] owns one store, a lifecycle scope for everything it
//! spawns, and a delivery ledger for its unique-only subscriptions. All
//! mutation goes through [`ViewModel::set_state`]; async work goes through
//! [`ViewModel::execute`] and friends, which project operation progress into
//! the state as [`Async`] values.

use std::future::{poll_fn, ready, Future};
use std::pin::pin;
use std::sync::Arc;

use futures_core::Stream;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::async_value::{Async, Metadata, OperationError};
use crate::job::JobHandle;
use crate::lifecycle::{LifecycleHandle, LifecycleOwner};
use crate::mock::{BlockExecutions, InitialStateMocking, MockBehaviorStack, StoreConfig};
use crate::purity::checked_reducer;
use crate::state::State;
use crate::store::{
    MockableStateStore, SerializedStateStore, StateStore, StateStream,
};
use crate::subscribe::{launch, DeliveryLedger, DeliveryMode};

/// Errors surfaced by view model store calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store's writer has stopped; no further reads or mutations run.
    #[error("state store closed")]
    Closed,
}

/// Accessor for the `Async` property an execution refreshes, used to retain
/// the previous success payload across `Loading` and `Fail`.
pub type RetainFn<S, T> = fn(&S) -> &Async<T>;

pub struct ViewModel<S: State> {
    store: Arc<dyn StateStore<S>>,
    mockable: Option<Arc<MockableStateStore<S>>>,
    config: Arc<StoreConfig>,
    scope: LifecycleOwner,
    ledger: Arc<DeliveryLedger>,
}

impl<S: State> ViewModel<S> {
    /// A view model with default configuration: the purity guard follows the
    /// build profile, mocking is off. Must be called from within a tokio
    /// runtime.
    pub fn new(initial: S) -> Self {
        let config = StoreConfig::new(cfg!(debug_assertions), MockBehaviorStack::new(), None);
        Self::with_config(Arc::new(config), initial, None)
    }

    /// A view model with an explicit configuration.
    ///
    /// `natural_initial` is the state the view model would construct itself;
    /// `mocked_initial` is the state a mock setup wants instead, consulted
    /// per the config's initial-state policy. With full seeding the mocked
    /// state is re-forced after construction, so initialization-time
    /// mutations cannot diverge from it.
    pub fn with_config(config: Arc<StoreConfig>, natural_initial: S, mocked_initial: Option<S>) -> Self {
        let initial = config.resolve_initial(natural_initial, mocked_initial.clone());
        let (store, mockable) = if config.mocking_enabled() {
            let mockable = Arc::new(MockableStateStore::new(initial, Arc::clone(&config)));
            (
                Arc::clone(&mockable) as Arc<dyn StateStore<S>>,
                Some(mockable),
            )
        } else {
            (
                Arc::new(SerializedStateStore::new(initial)) as Arc<dyn StateStore<S>>,
                None,
            )
        };
        let vm = Self {
            store,
            mockable,
            config,
            scope: LifecycleOwner::started(),
            ledger: Arc::new(DeliveryLedger::default()),
        };
        if vm.config.initial_state_mocking() == InitialStateMocking::Full {
            if let Some(mocked) = mocked_initial {
                vm.store.set_state(Box::new(move |_| mocked));
            }
        }
        vm
    }

    pub fn config(&self) -> &Arc<StoreConfig> {
        &self.config
    }

    /// Handle to this view model's own lifecycle scope. Destroyed by
    /// [`Self::on_cleared`] or drop.
    pub fn lifecycle(&self) -> LifecycleHandle {
        self.scope.handle()
    }

    /// The latest committed state.
    pub fn state(&self) -> S {
        self.store.state()
    }

    /// Subscribe to the raw snapshot stream: current state, then one
    /// emission per commit.
    pub fn stream(&self) -> StateStream<S> {
        self.store.subscribe()
    }

    /// Enqueue a mutation. The reducer must be a pure function of its input;
    /// in debug mode this is verified by running it twice.
    pub fn set_state(&self, reducer: impl Fn(S) -> S + Send + 'static) {
        self.committer().set(reducer);
    }

    /// Enqueue a read. It observes every mutation enqueued before it.
    pub fn with_state(&self, read: impl FnOnce(S) + Send + 'static) {
        self.store.with_state(Box::new(read));
    }

    /// The state after all currently enqueued mutations have committed.
    pub async fn await_state(&self) -> Result<S, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.store.with_state(Box::new(move |state| {
            let _ = tx.send(state);
        }));
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Inject the next state directly, bypassing reducers.
    ///
    /// # Panics
    ///
    /// Panics unless the view model was constructed with mocking enabled and
    /// the effective store behavior is scriptable.
    pub fn force_next(&self, state: S) {
        match &self.mockable {
            Some(mockable) => mockable.force_next(state),
            None => panic!("force_next requires a view model constructed with a mock behavior"),
        }
    }

    /// Destroy this view model's scope: running executions and
    /// subscriptions terminate at their next await point.
    pub fn on_cleared(&self) {
        tracing::debug!("view model cleared");
        self.scope.destroy();
    }

    /// Run `operation` and project its progress into the state.
    ///
    /// Commits `Loading` immediately, then exactly one of `Success` or
    /// `Fail` when the operation resolves. `retain` keeps the previous
    /// success payload visible inside `Loading` and `Fail`; `metadata` is
    /// attached to the `Success` value. Mock behavior can suppress the
    /// commits entirely, in which case the returned job only completes when
    /// the view model is cleared.
    pub fn execute<T, E, Fut, R>(
        &self,
        operation: Fut,
        retain: Option<RetainFn<S, T>>,
        metadata: Option<Metadata>,
        reduce: R,
    ) -> JobHandle
    where
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error> + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        R: Fn(S, Async<T>) -> S + Send + Sync + 'static,
    {
        let reduce = Arc::new(reduce);
        let committer = self.committer();
        match self.config.block_executions() {
            BlockExecutions::Completely => {
                tracing::warn!("execution blocked by mock behavior");
                return self.suspended_job();
            }
            BlockExecutions::WithLoading => {
                tracing::warn!("execution blocked by mock behavior after loading");
                commit_loading(&committer, retain, Arc::clone(&reduce));
                return self.suspended_job();
            }
            BlockExecutions::No => {}
        }
        commit_loading(&committer, retain, Arc::clone(&reduce));

        let mut scope = self.scope.handle();
        JobHandle::new(tokio::spawn(async move {
            let outcome = tokio::select! {
                result = operation => result,
                _ = scope.destroyed() => return,
            };
            match outcome {
                Ok(value) => committer.set(move |state| {
                    let projected = match &metadata {
                        Some(metadata) => {
                            Async::success(value.clone()).with_metadata(Arc::clone(metadata))
                        }
                        None => Async::success(value.clone()),
                    };
                    (*reduce)(state, projected)
                }),
                Err(err) => {
                    let error = OperationError::new(err);
                    tracing::debug!(%error, "execution failed");
                    committer.set(move |state| {
                        let retained = retain.and_then(|r| r(&state).value().cloned());
                        (*reduce)(state, Async::fail(error.clone(), retained))
                    });
                }
            }
        }))
    }

    /// Run a stream of results and project each into the state.
    ///
    /// Commits `Loading` first, then `Success` per item. The first `Err`
    /// item commits `Fail` and ends the job; so does stream exhaustion.
    pub fn execute_stream<T, E, St, R>(
        &self,
        stream: St,
        retain: Option<RetainFn<S, T>>,
        reduce: R,
    ) -> JobHandle
    where
        T: Clone + Send + Sync + 'static,
        E: Into<anyhow::Error> + 'static,
        St: Stream<Item = Result<T, E>> + Send + 'static,
        R: Fn(S, Async<T>) -> S + Send + Sync + 'static,
    {
        let reduce = Arc::new(reduce);
        let committer = self.committer();
        match self.config.block_executions() {
            BlockExecutions::Completely => {
                tracing::warn!("stream execution blocked by mock behavior");
                return self.suspended_job();
            }
            BlockExecutions::WithLoading => {
                tracing::warn!("stream execution blocked by mock behavior after loading");
                commit_loading(&committer, retain, Arc::clone(&reduce));
                return self.suspended_job();
            }
            BlockExecutions::No => {}
        }
        commit_loading(&committer, retain, Arc::clone(&reduce));

        let mut scope = self.scope.handle();
        JobHandle::new(tokio::spawn(async move {
            let mut stream = pin!(stream);
            loop {
                let item = tokio::select! {
                    item = poll_fn(|cx| stream.as_mut().poll_next(cx)) => item,
                    _ = scope.destroyed() => return,
                };
                match item {
                    Some(Ok(value)) => {
                        let reduce = Arc::clone(&reduce);
                        committer.set(move |state| (*reduce)(state, Async::success(value.clone())));
                    }
                    Some(Err(err)) => {
                        let error = OperationError::new(err);
                        tracing::debug!(%error, "stream execution failed");
                        let reduce = Arc::clone(&reduce);
                        committer.set(move |state| {
                            let retained = retain.and_then(|r| r(&state).value().cloned());
                            (*reduce)(state, Async::fail(error.clone(), retained))
                        });
                        return;
                    }
                    None => return,
                }
            }
        }))
    }

    /// Commit one mutation per stream item. No `Async` projection and no
    /// `Loading`; mock behavior can suppress the commits entirely.
    pub fn set_on_each<T, St, R>(&self, stream: St, reduce: R) -> JobHandle
    where
        T: Clone + Send + 'static,
        St: Stream<Item = T> + Send + 'static,
        R: Fn(S, T) -> S + Send + Sync + 'static,
    {
        if self.config.block_executions() != BlockExecutions::No {
            tracing::warn!("per-item commits blocked by mock behavior");
            return self.suspended_job();
        }
        let reduce = Arc::new(reduce);
        let committer = self.committer();
        let mut scope = self.scope.handle();
        JobHandle::new(tokio::spawn(async move {
            let mut stream = pin!(stream);
            loop {
                let item = tokio::select! {
                    item = poll_fn(|cx| stream.as_mut().poll_next(cx)) => item,
                    _ = scope.destroyed() => return,
                };
                let Some(item) = item else { return };
                let reduce = Arc::clone(&reduce);
                committer.set(move |state| (*reduce)(state, item.clone()));
            }
        }))
    }

    /// Subscribe to every committed state. No deduplication: each commit is
    /// delivered even when equal to the previous one.
    pub fn on_each<F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        action: F,
    ) -> JobHandle
    where
        F: FnMut(S) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        launch(
            self.store.subscribe(),
            lifecycle,
            self.scope.handle(),
            mode,
            false,
            Arc::clone(&self.ledger),
            |state: &S| state.clone(),
            action,
        )
    }

    /// Subscribe to a projection of the state. Consecutive equal projected
    /// values collapse to one delivery.
    pub fn on_each_projected<K, P, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        project: P,
        action: F,
    ) -> JobHandle
    where
        K: Clone + PartialEq + Send + 'static,
        P: FnMut(&S) -> K + Send + 'static,
        F: FnMut(K) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        launch(
            self.store.subscribe(),
            lifecycle,
            self.scope.handle(),
            mode,
            true,
            Arc::clone(&self.ledger),
            project,
            action,
        )
    }

    /// Subscribe to one selected field.
    pub fn on_each1<K1, P1, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        F: FnMut(K1) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(lifecycle, mode, move |s| p1(s), action)
    }

    /// Subscribe to two selected fields; delivered when either changes.
    pub fn on_each2<K1, K2, P1, P2, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        F: FnMut(K1, K2) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s)),
            move |(a, b)| action(a, b),
        )
    }

    /// Subscribe to three selected fields.
    pub fn on_each3<K1, K2, K3, P1, P2, P3, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        p3: P3,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        K3: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        P3: Fn(&S) -> K3 + Send + 'static,
        F: FnMut(K1, K2, K3) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s), p3(s)),
            move |(a, b, c)| action(a, b, c),
        )
    }

    /// Subscribe to four selected fields.
    #[allow(clippy::too_many_arguments)]
    pub fn on_each4<K1, K2, K3, K4, P1, P2, P3, P4, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        p3: P3,
        p4: P4,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        K3: Clone + PartialEq + Send + 'static,
        K4: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        P3: Fn(&S) -> K3 + Send + 'static,
        P4: Fn(&S) -> K4 + Send + 'static,
        F: FnMut(K1, K2, K3, K4) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s), p3(s), p4(s)),
            move |(a, b, c, d)| action(a, b, c, d),
        )
    }

    /// Subscribe to five selected fields.
    #[allow(clippy::too_many_arguments)]
    pub fn on_each5<K1, K2, K3, K4, K5, P1, P2, P3, P4, P5, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        p3: P3,
        p4: P4,
        p5: P5,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        K3: Clone + PartialEq + Send + 'static,
        K4: Clone + PartialEq + Send + 'static,
        K5: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        P3: Fn(&S) -> K3 + Send + 'static,
        P4: Fn(&S) -> K4 + Send + 'static,
        P5: Fn(&S) -> K5 + Send + 'static,
        F: FnMut(K1, K2, K3, K4, K5) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s), p3(s), p4(s), p5(s)),
            move |(a, b, c, d, e)| action(a, b, c, d, e),
        )
    }

    /// Subscribe to six selected fields.
    #[allow(clippy::too_many_arguments)]
    pub fn on_each6<K1, K2, K3, K4, K5, K6, P1, P2, P3, P4, P5, P6, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        p3: P3,
        p4: P4,
        p5: P5,
        p6: P6,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        K3: Clone + PartialEq + Send + 'static,
        K4: Clone + PartialEq + Send + 'static,
        K5: Clone + PartialEq + Send + 'static,
        K6: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        P3: Fn(&S) -> K3 + Send + 'static,
        P4: Fn(&S) -> K4 + Send + 'static,
        P5: Fn(&S) -> K5 + Send + 'static,
        P6: Fn(&S) -> K6 + Send + 'static,
        F: FnMut(K1, K2, K3, K4, K5, K6) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s), p3(s), p4(s), p5(s), p6(s)),
            move |(a, b, c, d, e, f)| action(a, b, c, d, e, f),
        )
    }

    /// Subscribe to seven selected fields.
    #[allow(clippy::too_many_arguments)]
    pub fn on_each7<K1, K2, K3, K4, K5, K6, K7, P1, P2, P3, P4, P5, P6, P7, F, Fut>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        p1: P1,
        p2: P2,
        p3: P3,
        p4: P4,
        p5: P5,
        p6: P6,
        p7: P7,
        mut action: F,
    ) -> JobHandle
    where
        K1: Clone + PartialEq + Send + 'static,
        K2: Clone + PartialEq + Send + 'static,
        K3: Clone + PartialEq + Send + 'static,
        K4: Clone + PartialEq + Send + 'static,
        K5: Clone + PartialEq + Send + 'static,
        K6: Clone + PartialEq + Send + 'static,
        K7: Clone + PartialEq + Send + 'static,
        P1: Fn(&S) -> K1 + Send + 'static,
        P2: Fn(&S) -> K2 + Send + 'static,
        P3: Fn(&S) -> K3 + Send + 'static,
        P4: Fn(&S) -> K4 + Send + 'static,
        P5: Fn(&S) -> K5 + Send + 'static,
        P6: Fn(&S) -> K6 + Send + 'static,
        P7: Fn(&S) -> K7 + Send + 'static,
        F: FnMut(K1, K2, K3, K4, K5, K6, K7) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| (p1(s), p2(s), p3(s), p4(s), p5(s), p6(s), p7(s)),
            move |(a, b, c, d, e, f, g)| action(a, b, c, d, e, f, g),
        )
    }

    /// Subscribe to an [`Async`] property; invokes the matching callback on
    /// each transition into `Success` or `Fail`.
    pub fn on_async<T, P, FS, FF>(
        &self,
        lifecycle: Option<LifecycleHandle>,
        mode: DeliveryMode,
        property: P,
        mut on_fail: FF,
        mut on_success: FS,
    ) -> JobHandle
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        P: Fn(&S) -> &Async<T> + Send + 'static,
        FS: FnMut(T) + Send + 'static,
        FF: FnMut(OperationError) + Send + 'static,
    {
        self.on_each_projected(
            lifecycle,
            mode,
            move |s| property(s).clone(),
            move |value: Async<T>| {
                match value {
                    Async::Success { value, .. } => on_success(value),
                    Async::Fail { error, .. } => on_fail(error),
                    Async::Uninitialized | Async::Loading { .. } => {}
                }
                ready(())
            },
        )
    }

    fn committer(&self) -> Committer<S> {
        Committer {
            store: Arc::clone(&self.store),
            debug: self.config.debug_mode,
        }
    }

    /// A job that never commits anything and only completes when this view
    /// model is cleared. Stands in for a blocked execution.
    fn suspended_job(&self) -> JobHandle {
        let mut scope = self.scope.handle();
        JobHandle::new(tokio::spawn(async move {
            scope.destroyed().await;
        }))
    }
}

/// Shared mutation entry point for execution tasks.
struct Committer<S: State> {
    store: Arc<dyn StateStore<S>>,
    debug: bool,
}

impl<S: State> Committer<S> {
    fn set(&self, reducer: impl Fn(S) -> S + Send + 'static) {
        if self.debug {
            self.store.set_state(checked_reducer(reducer));
        } else {
            self.store.set_state(Box::new(reducer));
        }
    }
}

fn commit_loading<S, T, R>(committer: &Committer<S>, retain: Option<RetainFn<S, T>>, reduce: Arc<R>)
where
    S: State,
    T: Clone + Send + Sync + 'static,
    R: Fn(S, Async<T>) -> S + Send + Sync + 'static,
{
    committer.set(move |state| {
        let retained = retain.and_then(|r| r(&state).value().cloned());
        (*reduce)(state, Async::loading(retained))
    });
}
