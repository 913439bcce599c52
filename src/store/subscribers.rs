//! Multicast fan-out of committed state snapshots.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Buffer depth for queued subscriber channels. When a subscriber falls this
/// far behind, the publishing writer suspends until it drains; intermediate
/// states are never dropped.
pub(crate) const SUBSCRIBER_BUFFER: usize = 64;

enum SubscriberSender<S> {
    /// Bounded channel drained by an async subscriber; the writer awaits
    /// capacity when the buffer is full.
    Queued(mpsc::Sender<S>),
    /// Unbounded channel for store variants that publish synchronously.
    Direct(mpsc::UnboundedSender<S>),
}

impl<S> SubscriberSender<S> {
    fn is_closed(&self) -> bool {
        match self {
            SubscriberSender::Queued(tx) => tx.is_closed(),
            SubscriberSender::Direct(tx) => tx.is_closed(),
        }
    }
}

/// Registry of live subscribers for one store.
///
/// The registry lock also serializes attachment against publication: `seed`
/// closures and `commit` closures run under it, so a subscriber attached
/// concurrently with a commit is either seeded with that commit's state or
/// registered in time to receive it, never neither and never both.
pub(crate) struct Subscribers<S> {
    senders: Mutex<Vec<SubscriberSender<S>>>,
}

impl<S: Clone + Send + 'static> Subscribers<S> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Attach a queued subscriber, pre-seeded with the state `seed` reads
    /// under the registry lock.
    pub(crate) fn attach_queued(&self, seed: impl FnOnce() -> S) -> StateStream<S> {
        let mut senders = self.senders.lock();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        // The initial snapshot occupies one buffer slot; capacity is nonzero
        // so this cannot fail on a fresh channel.
        let _ = tx.try_send(seed());
        senders.push(SubscriberSender::Queued(tx));
        StateStream {
            inner: StreamKind::Queued(rx),
        }
    }

    /// Attach a direct subscriber, pre-seeded with the state `seed` reads
    /// under the registry lock.
    pub(crate) fn attach_direct(&self, seed: impl FnOnce() -> S) -> StateStream<S> {
        let mut senders = self.senders.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(seed());
        senders.push(SubscriberSender::Direct(tx));
        StateStream {
            inner: StreamKind::Direct(rx),
        }
    }

    /// Publish from the serialized writer. `commit` stores the state and
    /// runs under the registry lock together with the recipient snapshot;
    /// the sends themselves happen outside it, suspending on full buffers
    /// rather than dropping intermediate states.
    pub(crate) async fn publish(&self, state: &S, commit: impl FnOnce()) {
        let queued: Vec<mpsc::Sender<S>> = {
            let senders = self.senders.lock();
            commit();
            senders
                .iter()
                .filter_map(|sender| match sender {
                    SubscriberSender::Queued(tx) => Some(tx.clone()),
                    SubscriberSender::Direct(_) => None,
                })
                .collect()
        };
        for tx in queued {
            if tx.send(state.clone()).await.is_err() {
                tracing::trace!("state dropped (subscriber gone)");
            }
        }
        self.prune();
    }

    /// Commit and publish synchronously; completes before returning.
    pub(crate) fn publish_now(&self, commit: impl FnOnce() -> S) {
        let mut senders = self.senders.lock();
        let state = commit();
        senders.retain(|sender| match sender {
            SubscriberSender::Direct(tx) => tx.send(state.clone()).is_ok(),
            // Queued subscribers on a synchronous store: best effort, a
            // stalled consumer loses its slot rather than blocking the caller.
            SubscriberSender::Queued(tx) => tx.try_send(state.clone()).is_ok(),
        });
    }

    fn prune(&self) {
        self.senders.lock().retain(|sender| !sender.is_closed());
    }
}

enum StreamKind<S> {
    Queued(mpsc::Receiver<S>),
    Direct(mpsc::UnboundedReceiver<S>),
}

/// An ordered, per-subscriber sequence of state snapshots.
///
/// Begins with the state current at subscription time, then yields one item
/// per commit in commit order. Ends when the store is torn down.
pub struct StateStream<S> {
    inner: StreamKind<S>,
}

impl<S> StateStream<S> {
    /// Receive the next snapshot, or `None` once the store is gone.
    pub async fn next(&mut self) -> Option<S> {
        match &mut self.inner {
            StreamKind::Queued(rx) => rx.recv().await,
            StreamKind::Direct(rx) => rx.recv().await,
        }
    }
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().inner {
            StreamKind::Queued(rx) => rx.poll_recv(cx),
            StreamKind::Direct(rx) => rx.poll_recv(cx),
        }
    }
}
