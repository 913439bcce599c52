//! Delivery modes and the per-view-model delivery ledger.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

/// How a subscription behaves across deactivation and reactivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// On reactivation, redeliver the most recent value even if it was
    /// already delivered before deactivation.
    RedeliverOnStart,
    /// Values are delivered at most once per distinct value, keyed by a
    /// subscription id that must be unique among this view model's active
    /// subscriptions. Survives resubscription under the same id.
    UniqueOnly(String),
}

impl DeliveryMode {
    pub fn unique(id: impl Into<String>) -> Self {
        Self::UniqueOnly(id.into())
    }

    pub(crate) fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::RedeliverOnStart => None,
            Self::UniqueOnly(id) => Some(id),
        }
    }
}

/// Records, per unique subscription id, the last value delivered and which
/// ids are currently live. Values are type-erased; each id is only ever used
/// with one projected type, so the downcast in [`Self::matches_last`] cannot
/// observe a foreign type unless an id is reused across subscriptions with
/// different projections, which the duplicate check forbids.
#[derive(Default)]
pub(crate) struct DeliveryLedger {
    last_delivered: Mutex<HashMap<String, Box<dyn Any + Send>>>,
    active: Mutex<HashSet<String>>,
}

impl DeliveryLedger {
    /// Claim an id for a live subscription.
    ///
    /// # Panics
    ///
    /// Panics if the id is already claimed: two simultaneous unique-only
    /// subscriptions with the same id would silently eat each other's
    /// deliveries.
    pub(crate) fn register(&self, id: &str) {
        let inserted = self.active.lock().insert(id.to_string());
        assert!(
            inserted,
            "duplicate unique-only subscription id {id:?}; ids must be unique \
             among a view model's simultaneously active subscriptions"
        );
    }

    pub(crate) fn deregister(&self, id: &str) {
        self.active.lock().remove(id);
    }

    /// Whether `value` equals the last value delivered under `id`.
    pub(crate) fn matches_last<K>(&self, id: &str, value: &K) -> bool
    where
        K: PartialEq + 'static,
    {
        self.last_delivered
            .lock()
            .get(id)
            .and_then(|last| last.downcast_ref::<K>())
            .is_some_and(|last| last == value)
    }

    pub(crate) fn record<K>(&self, id: &str, value: K)
    where
        K: Send + 'static,
    {
        self.last_delivered
            .lock()
            .insert(id.to_string(), Box::new(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_tracks_last_delivered_per_id() {
        let ledger = DeliveryLedger::default();
        assert!(!ledger.matches_last("a", &1i64));
        ledger.record("a", 1i64);
        assert!(ledger.matches_last("a", &1i64));
        assert!(!ledger.matches_last("a", &2i64));
        assert!(!ledger.matches_last("b", &1i64));
    }

    #[test]
    fn id_survives_resubscription() {
        let ledger = DeliveryLedger::default();
        ledger.register("a");
        ledger.record("a", 5i64);
        ledger.deregister("a");
        // The delivery record outlives the subscription.
        ledger.register("a");
        assert!(ledger.matches_last("a", &5i64));
    }

    #[test]
    #[should_panic(expected = "duplicate unique-only subscription id")]
    fn duplicate_active_id_panics() {
        let ledger = DeliveryLedger::default();
        ledger.register("a");
        ledger.register("a");
    }
}
