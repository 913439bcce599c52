//! Subscription delivery: dedup, delivery modes, lifecycle gating.

use std::fmt::Debug;
use std::future::ready;
use std::time::Duration;

use statecraft::{Async, DeliveryMode, LifecycleOwner, State, ViewModel};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Clone, PartialEq, Debug, Default)]
struct Dashboard {
    count: i64,
    label: String,
    report: Async<String>,
}

impl State for Dashboard {}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("subscription channel closed")
}

/// Waits until every task has gone idle without a delivery arriving.
async fn assert_quiet<T: Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(extra)) = timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected delivery: {extra:?}");
    }
}

fn bump_count(vm: &ViewModel<Dashboard>) {
    vm.set_state(|s| Dashboard {
        count: s.count + 1,
        ..s
    });
}

fn relabel(vm: &ViewModel<Dashboard>, label: &str) {
    let label = label.to_string();
    vm.set_state(move |s| Dashboard {
        label: label.clone(),
        ..s
    });
}

#[tokio::test(start_paused = true)]
async fn projected_subscription_skips_unchanged_values() {
    let vm = ViewModel::new(Dashboard::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each1(None, DeliveryMode::RedeliverOnStart, |s| s.count, move |count| {
        let _ = tx.send(count);
        ready(())
    });

    assert_eq!(recv(&mut rx).await, 0);
    relabel(&vm, "a");
    relabel(&vm, "b");
    assert_quiet(&mut rx).await;

    bump_count(&vm);
    assert_eq!(recv(&mut rx).await, 1);
}

#[tokio::test(start_paused = true)]
async fn whole_state_subscription_does_not_dedup() {
    let vm = ViewModel::new(Dashboard::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each(None, DeliveryMode::RedeliverOnStart, move |s: Dashboard| {
        let _ = tx.send(s.count);
        ready(())
    });

    assert_eq!(recv(&mut rx).await, 0);
    // Identity commits still publish; raw subscriptions see each one.
    vm.set_state(|s| s);
    vm.set_state(|s| s);
    assert_eq!(recv(&mut rx).await, 0);
    assert_eq!(recv(&mut rx).await, 0);
}

#[tokio::test(start_paused = true)]
async fn inactive_subscriber_coalesces_to_the_newest_state() {
    let vm = ViewModel::new(Dashboard::default());
    let owner = LifecycleOwner::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each1(
        Some(owner.handle()),
        DeliveryMode::RedeliverOnStart,
        |s| s.count,
        move |count| {
            let _ = tx.send(count);
            ready(())
        },
    );

    bump_count(&vm);
    bump_count(&vm);
    bump_count(&vm);
    vm.await_state().await.unwrap();
    // Held while inactive; intermediate values are superseded.
    assert_quiet(&mut rx).await;

    owner.set_active(true);
    assert_eq!(recv(&mut rx).await, 3);
    assert_quiet(&mut rx).await;
}

#[tokio::test(start_paused = true)]
async fn redeliver_on_start_replays_on_reactivation() {
    let vm = ViewModel::new(Dashboard::default());
    let owner = LifecycleOwner::started();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each1(
        Some(owner.handle()),
        DeliveryMode::RedeliverOnStart,
        |s| s.count,
        move |count| {
            let _ = tx.send(count);
            ready(())
        },
    );

    assert_eq!(recv(&mut rx).await, 0);

    owner.set_active(false);
    assert_quiet(&mut rx).await;
    owner.set_active(true);
    assert_eq!(recv(&mut rx).await, 0);
}

#[tokio::test(start_paused = true)]
async fn unique_only_does_not_replay_on_reactivation() {
    let vm = ViewModel::new(Dashboard::default());
    let owner = LifecycleOwner::started();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each1(
        Some(owner.handle()),
        DeliveryMode::unique("count"),
        |s| s.count,
        move |count| {
            let _ = tx.send(count);
            ready(())
        },
    );

    assert_eq!(recv(&mut rx).await, 0);

    owner.set_active(false);
    assert_quiet(&mut rx).await;
    owner.set_active(true);
    assert_quiet(&mut rx).await;

    bump_count(&vm);
    assert_eq!(recv(&mut rx).await, 1);
}

#[tokio::test(start_paused = true)]
async fn unique_only_survives_resubscription_under_the_same_id() {
    let vm = ViewModel::new(Dashboard::default());
    bump_count(&vm);
    vm.await_state().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job = vm.on_each1(None, DeliveryMode::unique("count"), |s| s.count, {
        let tx = tx.clone();
        move |count| {
            let _ = tx.send(count);
            ready(())
        }
    });
    assert_eq!(recv(&mut rx).await, 1);

    job.cancel();
    job.join().await;

    // Same id, same current value: nothing is redelivered.
    let _job = vm.on_each1(None, DeliveryMode::unique("count"), |s| s.count, move |count| {
        let _ = tx.send(count);
        ready(())
    });
    assert_quiet(&mut rx).await;

    bump_count(&vm);
    assert_eq!(recv(&mut rx).await, 2);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "duplicate unique-only subscription id")]
async fn duplicate_unique_id_panics_at_the_call_site() {
    let vm = ViewModel::new(Dashboard::default());
    let _first = vm.on_each1(None, DeliveryMode::unique("count"), |s| s.count, |_| ready(()));
    let _second = vm.on_each1(None, DeliveryMode::unique("count"), |s| s.count, |_| ready(()));
}

#[tokio::test(start_paused = true)]
async fn on_async_routes_success_and_failure() {
    let vm = ViewModel::new(Dashboard::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let success_tx = tx.clone();
    let _job = vm.on_async(
        None,
        DeliveryMode::RedeliverOnStart,
        |s: &Dashboard| &s.report,
        move |error| {
            let _ = tx.send(format!("fail: {error}"));
        },
        move |report| {
            let _ = success_tx.send(format!("ok: {report}"));
        },
    );

    vm.execute(
        async { Ok::<_, anyhow::Error>("ready".to_string()) },
        None,
        None,
        |s, report| Dashboard { report, ..s },
    )
    .join()
    .await;
    assert_eq!(recv(&mut rx).await, "ok: ready");

    vm.execute(
        async { Err::<String, _>(anyhow::anyhow!("boom")) },
        None,
        None,
        |s, report| Dashboard { report, ..s },
    )
    .join()
    .await;
    assert_eq!(recv(&mut rx).await, "fail: boom");
}

#[tokio::test(start_paused = true)]
async fn multi_field_subscription_fires_when_any_field_changes() {
    let vm = ViewModel::new(Dashboard::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let _job = vm.on_each2(
        None,
        DeliveryMode::RedeliverOnStart,
        |s| s.count,
        |s| s.label.clone(),
        move |count, label| {
            let _ = tx.send((count, label));
            ready(())
        },
    );

    assert_eq!(recv(&mut rx).await, (0, String::new()));
    relabel(&vm, "x");
    assert_eq!(recv(&mut rx).await, (0, "x".to_string()));
    bump_count(&vm);
    assert_eq!(recv(&mut rx).await, (1, "x".to_string()));
}

#[tokio::test(start_paused = true)]
async fn clearing_the_view_model_ends_subscriptions() {
    let vm = ViewModel::new(Dashboard::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let job = vm.on_each1(None, DeliveryMode::RedeliverOnStart, |s| s.count, move |count| {
        let _ = tx.send(count);
        ready(())
    });
    assert_eq!(recv(&mut rx).await, 0);

    vm.on_cleared();
    job.join().await;

    // The store still accepts mutations, but nothing is delivered.
    bump_count(&vm);
    vm.await_state().await.unwrap();
    assert_quiet(&mut rx).await;
}
