//! Position reconciliation and yield attribution.
//!
//! `reconcile`, `yield_calc` and `valuation` are pure; `reconciler` is the
//! only part that touches the store.

pub mod locks;
pub mod reconcile;
pub mod reconciler;
pub mod valuation;
pub mod yield_calc;

pub use locks::PairLocks;
pub use reconcile::{
    check_invariants, plan_reconciliation, weighted_entry_day, ChangeKind, Observation,
    ReconcilePlan,
};
pub use reconciler::{Reconciler, Reconciliation};
pub use valuation::{value_position, Valuation};
pub use yield_calc::{compute_report, holding_days, impermanent_loss_pct, price_ratio_multiple};
