//! The subscription delivery loop.
//!
//! Each subscription is one spawned task that projects committed states to a
//! key, gates delivery on an optional host lifecycle, and invokes the
//! subscriber action while active. A slow or inactive subscriber never
//! observes a stale intermediate forever: pending keys coalesce to the
//! newest one, and delivery resumes from there on reactivation.

use std::future::Future;
use std::sync::Arc;

use crate::job::JobHandle;
use crate::lifecycle::{LifecycleDestroyed, LifecycleHandle, LifecycleState};
use crate::state::State;
use crate::store::StateStream;

use super::delivery::{DeliveryLedger, DeliveryMode};

/// Spawn the delivery task for one subscription.
///
/// `lifecycle` is the host surface gating delivery (`None` means always
/// active); `scope` is the owning view model's lifecycle, whose destruction
/// terminates the subscription. With `dedup`, consecutive equal projected
/// keys collapse to one delivery.
///
/// # Panics
///
/// Panics if `mode` carries a unique-only id already claimed by a live
/// subscription on the same ledger.
pub(crate) fn launch<S, K, P, A, Fut>(
    stream: StateStream<S>,
    lifecycle: Option<LifecycleHandle>,
    scope: LifecycleHandle,
    mode: DeliveryMode,
    dedup: bool,
    ledger: Arc<DeliveryLedger>,
    project: P,
    action: A,
) -> JobHandle
where
    S: State,
    K: Clone + PartialEq + Send + 'static,
    P: FnMut(&S) -> K + Send + 'static,
    A: FnMut(K) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // Claim the id in the caller's context so a duplicate fails at the
    // subscription call site, not inside a detached task.
    if let Some(id) = mode.subscription_id() {
        ledger.register(id);
    }
    let handle = tokio::spawn(run_subscription(
        stream, lifecycle, scope, mode, dedup, ledger, project, action,
    ));
    JobHandle::new(handle)
}

#[allow(clippy::too_many_arguments)]
async fn run_subscription<S, K, P, A, Fut>(
    mut stream: StateStream<S>,
    mut lifecycle: Option<LifecycleHandle>,
    scope: LifecycleHandle,
    mode: DeliveryMode,
    dedup: bool,
    ledger: Arc<DeliveryLedger>,
    mut project: P,
    mut action: A,
) where
    S: State,
    K: Clone + PartialEq + Send + 'static,
    P: FnMut(&S) -> K + Send + 'static,
    A: FnMut(K) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let _deregister = mode.subscription_id().map(|id| {
        scopeguard::guard((Arc::clone(&ledger), id.to_string()), |(ledger, id)| {
            ledger.deregister(&id);
        })
    });

    // Newest undelivered key; older undelivered keys are superseded.
    let mut pending: Option<K> = None;
    // Last key handed to the action, for redelivery on reactivation.
    let mut delivered: Option<K> = None;
    // Last key projected from the stream, for dedup.
    let mut last_projected: Option<K> = None;
    let mut scope_watch = scope.clone();

    loop {
        while host_is_active(&lifecycle) && scope.current() != LifecycleState::Destroyed {
            let Some(key) = pending.take() else { break };
            if let Some(id) = mode.subscription_id() {
                if ledger.matches_last(id, &key) {
                    delivered = Some(key);
                    continue;
                }
            }
            let mut cancel = scope.clone();
            tokio::select! {
                _ = action(key.clone()) => {}
                _ = cancel.destroyed() => return,
            }
            if let Some(id) = mode.subscription_id() {
                ledger.record(id, key.clone());
            }
            delivered = Some(key);
        }

        tokio::select! {
            state = stream.next() => {
                let Some(state) = state else { return };
                let key = project(&state);
                let duplicate = dedup && last_projected.as_ref() == Some(&key);
                last_projected = Some(key.clone());
                if !duplicate {
                    pending = Some(key);
                }
            }
            changed = host_changed(lifecycle.as_mut()) => {
                match changed {
                    Ok(LifecycleState::Active) => {
                        if pending.is_none() && mode == DeliveryMode::RedeliverOnStart {
                            pending = delivered.clone();
                        }
                    }
                    Ok(_) => {}
                    Err(LifecycleDestroyed) => return,
                }
            }
            _ = scope_watch.destroyed() => return,
        }
    }
}

fn host_is_active(lifecycle: &Option<LifecycleHandle>) -> bool {
    lifecycle.as_ref().map_or(true, LifecycleHandle::is_active)
}

/// Without a host lifecycle there is never a phase change to observe.
async fn host_changed(
    lifecycle: Option<&mut LifecycleHandle>,
) -> Result<LifecycleState, LifecycleDestroyed> {
    match lifecycle {
        Some(handle) => handle.changed().await,
        None => std::future::pending().await,
    }
}
