//! Transactional reconciliation of one (wallet, token unit) pair.

use super::locks::PairLocks;
use super::reconcile::{check_invariants, plan_reconciliation, ChangeKind, Observation};
use crate::db::{PositionRow, Repository};
use crate::domain::{
    PositionEntry, PositionEvent, PositionKey, PriceRatio, TimeMs, TokenAmount, TrackedPosition,
};
use crate::error::PositionError;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Entry as stored after the call.
    pub entry: PositionEntry,
    pub change: ChangeKind,
    /// Event appended by this call, if any.
    pub event: Option<PositionEvent>,
}

/// Applies observations to the position store.
///
/// The row read, the plan, the row upsert and the event append all happen
/// in one SQLite transaction while the pair's lock is held.
#[derive(Debug)]
pub struct Reconciler {
    repo: Arc<Repository>,
    locks: PairLocks,
}

impl Reconciler {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            locks: PairLocks::new(),
        }
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Reconcile one observation.
    ///
    /// Returns `Ok(None)` when the pair has no row and nothing is held.
    ///
    /// # Errors
    /// - `Validation` for a negative amount; nothing is read or written.
    /// - `MissingPriceData` when an LP deposit or discovery has no ratio.
    /// - `Consistency` when the stored row is impossible or already frozen,
    ///   or when the planned event's key is already in the log. Nothing is
    ///   written in the latter case.
    /// - `Db` on storage failure; the transaction is rolled back.
    pub async fn reconcile(
        &self,
        target: &TrackedPosition,
        observed_amount: i128,
        observed_price_ratio: Option<PriceRatio>,
        as_of: TimeMs,
    ) -> Result<Option<Reconciliation>, PositionError> {
        let observation = Observation {
            amount: TokenAmount::from_observed(observed_amount)?,
            price_ratio: observed_price_ratio,
            as_of,
        };
        let key = &target.key;

        let _guard = self.locks.acquire(key).await;
        let mut tx = self.repo.begin_write().await?;

        let existing = match self.repo.fetch_position_tx(&mut *tx, key).await? {
            None => None,
            Some(row) => match load_checked(&row) {
                Ok(entry) => Some(entry),
                Err(reason) => {
                    tx.rollback().await?;
                    return Err(self.freeze(key, &row, reason, as_of).await);
                }
            },
        };

        // on error the transaction is dropped and rolled back
        let Some(plan) = plan_reconciliation(target, existing.as_ref(), &observation)? else {
            tx.rollback().await?;
            return Ok(None);
        };

        if !plan.needs_write() {
            tx.rollback().await?;
            debug!(
                wallet = %key.wallet,
                token_unit = %key.token_unit,
                as_of = as_of.as_ms(),
                last_check = plan.entry.last_amount_check.as_ms(),
                "Ignoring stale observation"
            );
            return Ok(Some(Reconciliation {
                entry: plan.entry,
                change: plan.change,
                event: None,
            }));
        }

        self.repo.upsert_position_tx(&mut *tx, &plan.entry).await?;
        // rolling back also discards the row update above
        let event = match plan.event {
            Some(event) => {
                let sequence = self.repo.count_events_tx(&mut *tx, key).await?;
                let event = event.with_sequence(sequence.max(0) as u64);
                if !self.repo.append_event_tx(&mut *tx, &event).await? {
                    tx.rollback().await?;
                    return Err(PositionError::Consistency {
                        key: key.clone(),
                        reason: format!("event {} already recorded", event.event_key),
                    });
                }
                Some(event)
            }
            None => None,
        };
        tx.commit().await?;

        match plan.change {
            ChangeKind::Unchanged => debug!(
                wallet = %key.wallet,
                token_unit = %key.token_unit,
                "Position unchanged"
            ),
            change => info!(
                wallet = %key.wallet,
                token_unit = %key.token_unit,
                change = change.as_str(),
                amount = %plan.entry.last_known_amount,
                "Position reconciled"
            ),
        }

        Ok(Some(Reconciliation {
            entry: plan.entry,
            change: plan.change,
            event,
        }))
    }

    /// Mark a row frozen and alert the operator channel. Returns the error
    /// to surface to the caller.
    async fn freeze(
        &self,
        key: &PositionKey,
        row: &PositionRow,
        reason: String,
        at: TimeMs,
    ) -> PositionError {
        if !row.is_frozen() {
            error!(
                target: "operator",
                wallet = %key.wallet,
                token_unit = %key.token_unit,
                reason = %reason,
                "Freezing position with inconsistent stored state"
            );
            if let Err(e) = self.repo.freeze_position(key, &reason, at).await {
                error!(
                    target: "operator",
                    wallet = %key.wallet,
                    token_unit = %key.token_unit,
                    error = %e,
                    "Failed to persist freeze"
                );
            }
        }
        PositionError::Consistency {
            key: key.clone(),
            reason,
        }
    }
}

/// Decode and validate a stored row; frozen rows are rejected outright.
fn load_checked(row: &PositionRow) -> Result<PositionEntry, String> {
    if row.is_frozen() {
        return Err(format!(
            "position is frozen: {}",
            row.frozen_reason.as_deref().unwrap_or("no reason recorded")
        ));
    }
    let entry = row.decode()?;
    check_invariants(&entry)?;
    Ok(entry)
}
