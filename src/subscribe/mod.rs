//! Subscription delivery: modes, the per-view-model ledger, and the engine.

mod delivery;
mod engine;

pub use delivery::DeliveryMode;

pub(crate) use delivery::DeliveryLedger;
pub(crate) use engine::launch;
