//! Periodic reconciliation of every tracked pair through a bounded worker
//! pool.

use crate::datasource::{BalanceSource, DataSourceError, ReserveSource};
use crate::domain::{PriceRatio, TimeMs, TrackedPosition};
use crate::engine::{ChangeKind, Reconciler, Reconciliation};
use crate::error::PositionError;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub sweep_id: Uuid,
    pub targets: usize,
    pub discovered: usize,
    pub unchanged: usize,
    pub deposits: usize,
    pub withdrawals: usize,
    pub closed: usize,
    pub reopened: usize,
    pub stale: usize,
    /// Pairs with no row and nothing held.
    pub empty: usize,
    pub upstream_errors: usize,
    pub missing_price: usize,
    pub validation_errors: usize,
    pub consistency_errors: usize,
    pub db_errors: usize,
    /// Pairs never started because shutdown was requested.
    pub cancelled: usize,
}

impl SweepSummary {
    fn new(sweep_id: Uuid, targets: usize) -> Self {
        Self {
            sweep_id,
            targets,
            ..Self::default()
        }
    }

    fn record(&mut self, outcome: PairOutcome) {
        match outcome {
            PairOutcome::Cancelled => self.cancelled += 1,
            PairOutcome::Done(Ok(None)) => self.empty += 1,
            PairOutcome::Done(Ok(Some(change))) => match change {
                ChangeKind::Discovered => self.discovered += 1,
                ChangeKind::Unchanged => self.unchanged += 1,
                ChangeKind::Deposit => self.deposits += 1,
                ChangeKind::Withdrawal => self.withdrawals += 1,
                ChangeKind::Closed => self.closed += 1,
                ChangeKind::Reopened => self.reopened += 1,
                ChangeKind::Stale => self.stale += 1,
            },
            PairOutcome::Done(Err(kind)) => match kind {
                "upstream_timeout" => self.upstream_errors += 1,
                "missing_price_data" => self.missing_price += 1,
                "validation" => self.validation_errors += 1,
                "consistency" => self.consistency_errors += 1,
                _ => self.db_errors += 1,
            },
        }
    }

    /// Pairs that ended in an error of any kind.
    pub fn failed(&self) -> usize {
        self.upstream_errors
            + self.missing_price
            + self.validation_errors
            + self.consistency_errors
            + self.db_errors
    }
}

enum PairOutcome {
    Cancelled,
    Done(Result<Option<ChangeKind>, &'static str>),
}

/// Drives balance lookups and reconciliation for a set of tracked pairs.
#[derive(Debug, Clone)]
pub struct Sweeper {
    reconciler: Arc<Reconciler>,
    balances: Arc<dyn BalanceSource>,
    reserves: Arc<dyn ReserveSource>,
    concurrency: usize,
}

impl Sweeper {
    pub fn new(
        reconciler: Arc<Reconciler>,
        balances: Arc<dyn BalanceSource>,
        reserves: Arc<dyn ReserveSource>,
        concurrency: usize,
    ) -> Self {
        Self {
            reconciler,
            balances,
            reserves,
            concurrency: concurrency.max(1),
        }
    }

    /// Reconcile every target once.
    ///
    /// At most `concurrency` pairs are in flight. Once `shutdown` reads
    /// `true` no further pair is started; pairs already running finish.
    pub async fn run_sweep(
        &self,
        targets: &[TrackedPosition],
        shutdown: watch::Receiver<bool>,
    ) -> SweepSummary {
        let sweep_id = Uuid::new_v4();
        let span = info_span!("sweep", %sweep_id, targets = targets.len());

        async move {
            info!("Sweep started");
            // Each pair future owns its handles so the sweep can run on a
            // spawned task.
            let outcomes: Vec<PairOutcome> = stream::iter(targets.to_vec())
                .map(|target| {
                    let sweeper = self.clone();
                    let shutdown = shutdown.clone();
                    async move {
                        let stopping = *shutdown.borrow();
                        if stopping {
                            return PairOutcome::Cancelled;
                        }
                        PairOutcome::Done(sweeper.sweep_pair(&target).await)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let mut summary = SweepSummary::new(sweep_id, targets.len());
            for outcome in outcomes {
                summary.record(outcome);
            }
            info!(
                discovered = summary.discovered,
                deposits = summary.deposits,
                withdrawals = summary.withdrawals,
                closed = summary.closed,
                failed = summary.failed(),
                cancelled = summary.cancelled,
                "Sweep finished"
            );
            summary
        }
        .instrument(span)
        .await
    }

    async fn sweep_pair(&self, target: &TrackedPosition) -> Result<Option<ChangeKind>, &'static str> {
        match self.observe_and_reconcile(target).await {
            Ok(result) => Ok(result.map(|r| r.change)),
            Err(err) => {
                let kind = err.kind();
                match &err {
                    PositionError::UpstreamTimeout { .. }
                    | PositionError::MissingPriceData(_)
                    | PositionError::Validation(_) => warn!(
                        wallet = %target.key.wallet,
                        token_unit = %target.key.token_unit,
                        kind,
                        error = %err,
                        "Skipping pair"
                    ),
                    // already reported on the operator channel
                    PositionError::Consistency { .. } => debug!(
                        wallet = %target.key.wallet,
                        token_unit = %target.key.token_unit,
                        error = %err,
                        "Pair is frozen"
                    ),
                    PositionError::Db(_) => error!(
                        wallet = %target.key.wallet,
                        token_unit = %target.key.token_unit,
                        error = %err,
                        "Reconciliation failed"
                    ),
                }
                Err(kind)
            }
        }
    }

    /// Fetch balance (and reserves for LP rows), then reconcile.
    async fn observe_and_reconcile(
        &self,
        target: &TrackedPosition,
    ) -> Result<Option<Reconciliation>, PositionError> {
        let key = &target.key;
        let upstream = |source: DataSourceError| PositionError::UpstreamTimeout {
            key: key.clone(),
            source,
        };

        let amount = self
            .balances
            .get_token_amount(&key.wallet, &key.token_unit)
            .await
            .map_err(upstream)?;

        let price_ratio = match (&target.pool_id, target.position_type.is_lp()) {
            (Some(pool_id), true) => {
                let reserves = self
                    .reserves
                    .get_pool_reserves(pool_id)
                    .await
                    .map_err(upstream)?;
                PriceRatio::from_reserves(&reserves)
            }
            _ => None,
        };

        self.reconciler
            .reconcile(target, amount, price_ratio, TimeMs::now())
            .await
    }

    /// Run a sweep every `interval` until `shutdown` flips to `true`.
    pub async fn run_periodic(
        self: Arc<Self>,
        targets: Arc<Vec<TrackedPosition>>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_sweep(&targets, shutdown.clone()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Periodic sweep stopped");
                        return;
                    }
                }
            }
        }
    }
}
