//! Pure reconciliation planning: given the stored entry and a fresh
//! observation, decide the new entry and the event to record.
//!
//! No I/O happens here; [`super::Reconciler`] loads, plans and persists.

use crate::domain::{
    EpochDay, PositionEntry, PositionEvent, PositionEventType, PositionStatus, PriceRatio,
    TimeMs, TokenAmount, TrackedPosition,
};
use crate::error::PositionError;

/// A fresh balance snapshot for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub amount: TokenAmount,
    pub price_ratio: Option<PriceRatio>,
    pub as_of: TimeMs,
}

/// How an observation changed the stored position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First nonzero observation; row created without an event.
    Discovered,
    /// Same amount; only `last_amount_check` moved.
    Unchanged,
    Deposit,
    /// Partial withdrawal.
    Withdrawal,
    /// Withdrawal to zero.
    Closed,
    /// Deposit into a closed position.
    Reopened,
    /// Observation older than the last check; ignored.
    Stale,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Discovered => "discovered",
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Deposit => "deposit",
            ChangeKind::Withdrawal => "withdrawal",
            ChangeKind::Closed => "closed",
            ChangeKind::Reopened => "reopened",
            ChangeKind::Stale => "stale",
        }
    }
}

/// Outcome of planning one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub entry: PositionEntry,
    pub change: ChangeKind,
    pub event: Option<PositionEvent>,
}

impl ReconcilePlan {
    /// Whether the plan needs a write at all.
    pub fn needs_write(&self) -> bool {
        self.change != ChangeKind::Stale
    }
}

/// Semantic checks on a decoded row. Returns the reason on failure.
pub fn check_invariants(entry: &PositionEntry) -> Result<(), String> {
    if let (Some(original), Some(current)) = (entry.original_entry_date, entry.entry_date) {
        if original > current {
            return Err(format!(
                "original_entry_date {} is after entry_date {}",
                original, current
            ));
        }
    }
    if entry.status == PositionStatus::Closed && !entry.last_known_amount.is_zero() {
        return Err(format!(
            "closed position holds {}",
            entry.last_known_amount
        ));
    }
    Ok(())
}

/// Decide what an observation does to a pair.
///
/// `existing` must already have passed [`check_invariants`]. Returns
/// `Ok(None)` when there is no row and nothing is held.
pub fn plan_reconciliation(
    target: &TrackedPosition,
    existing: Option<&PositionEntry>,
    obs: &Observation,
) -> Result<Option<ReconcilePlan>, PositionError> {
    let Some(existing) = existing else {
        return plan_discovery(target, obs);
    };

    if obs.as_of < existing.last_amount_check {
        return Ok(Some(ReconcilePlan {
            entry: existing.clone(),
            change: ChangeKind::Stale,
            event: None,
        }));
    }

    let delta = obs.amount.delta_from(existing.last_known_amount);
    let mut entry = existing.clone();
    entry.last_amount_check = obs.as_of;
    entry.updated_at = obs.as_of;

    if delta == 0 {
        return Ok(Some(ReconcilePlan {
            entry,
            change: ChangeKind::Unchanged,
            event: None,
        }));
    }

    if delta > 0 {
        plan_deposit(existing, entry, obs, delta).map(Some)
    } else {
        Ok(Some(plan_withdrawal(entry, obs, delta)))
    }
}

fn plan_discovery(
    target: &TrackedPosition,
    obs: &Observation,
) -> Result<Option<ReconcilePlan>, PositionError> {
    if obs.amount.is_zero() {
        return Ok(None);
    }
    if target.position_type.is_lp() && obs.price_ratio.is_none() {
        return Err(PositionError::MissingPriceData(target.key.clone()));
    }
    Ok(Some(ReconcilePlan {
        entry: PositionEntry::discovered(target, obs.amount, obs.price_ratio, obs.as_of),
        change: ChangeKind::Discovered,
        event: None,
    }))
}

fn plan_deposit(
    existing: &PositionEntry,
    mut entry: PositionEntry,
    obs: &Observation,
    delta: i128,
) -> Result<ReconcilePlan, PositionError> {
    let is_lp = existing.position_type.is_lp();
    let observed_ratio = match (is_lp, obs.price_ratio) {
        (true, None) => return Err(PositionError::MissingPriceData(existing.key.clone())),
        (true, Some(r)) => Some(r),
        (false, _) => None,
    };

    let prior = existing.last_known_amount;
    let as_of_day = obs.as_of.day();

    // Legacy rows without a known first-entry date get this observation's day.
    let original = existing.original_entry_date.unwrap_or(as_of_day);

    let weighted_day = match existing.entry_date {
        Some(day) if !prior.is_zero() => weighted_entry_day(prior, day, delta, as_of_day),
        _ => as_of_day,
    };
    entry.original_entry_date = Some(original);
    entry.entry_date = Some(weighted_day.max(original));

    if let Some(incoming) = observed_ratio {
        entry.entry_price_ratio = Some(match existing.entry_price_ratio {
            Some(basis) if !prior.is_zero() => {
                basis.weighted_with(prior.as_f64(), incoming, delta as f64)
            }
            _ => incoming,
        });
    }

    let change = if existing.status == PositionStatus::Closed {
        ChangeKind::Reopened
    } else {
        ChangeKind::Deposit
    };
    entry.status = PositionStatus::Active;
    entry.last_known_amount = obs.amount;

    let event = PositionEvent::new(
        entry.key.clone(),
        PositionEventType::Deposit,
        TokenAmount::new(delta.unsigned_abs()),
        obs.amount,
        observed_ratio,
        obs.as_of,
    );

    Ok(ReconcilePlan {
        entry,
        change,
        event: Some(event),
    })
}

fn plan_withdrawal(mut entry: PositionEntry, obs: &Observation, delta: i128) -> ReconcilePlan {
    // Cost basis of what remains is unchanged: entry date and ratio stay.
    entry.last_known_amount = obs.amount;
    let change = if obs.amount.is_zero() {
        entry.status = PositionStatus::Closed;
        ChangeKind::Closed
    } else {
        ChangeKind::Withdrawal
    };

    let event = PositionEvent::new(
        entry.key.clone(),
        PositionEventType::Withdrawal,
        TokenAmount::new(delta.unsigned_abs()),
        obs.amount,
        None,
        obs.as_of,
    );

    ReconcilePlan {
        entry,
        change,
        event: Some(event),
    }
}

/// Amount-weighted mean of two entry days, rounded half up to a whole day.
///
/// `entry + round(delta * (as_of - entry) / (prior + delta))`, exact in
/// `i128`; falls back to f64 only if the product overflows.
pub fn weighted_entry_day(
    prior: TokenAmount,
    entry_day: EpochDay,
    delta: i128,
    as_of_day: EpochDay,
) -> EpochDay {
    let span = i128::from(as_of_day.as_i64() - entry_day.as_i64());
    let prior = prior.raw() as i128;

    let exact = delta.checked_mul(span).and_then(|num| {
        let den = prior.checked_add(delta)?;
        let twice_num = num.checked_mul(2)?;
        let twice_den = den.checked_mul(2)?;
        // floor((2n + d) / 2d) == round-half-up(n / d) for d > 0
        Some((twice_num.checked_add(den)?).div_euclid(twice_den))
    });

    let offset = match exact {
        Some(offset) => offset as i64,
        None => {
            let fraction = delta as f64 / (prior as f64 + delta as f64);
            (fraction * span as f64 + 0.5).floor() as i64
        }
    };
    entry_day.plus_days(offset)
}
