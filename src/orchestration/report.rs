//! Read-side assembly of per-position yield reports.

use crate::datasource::{RateSource, ReserveSource};
use crate::db::{PositionRow, Repository};
use crate::domain::{
    Decimal, EpochDay, Figure, PoolReserves, PositionEntry, PositionEvent, PositionEventType,
    PositionKey, PositionType, PriceRatio, TimeMs, TokenAmount, WalletAddress,
};
use crate::engine::{compute_report, value_position};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// One row of the position report.
///
/// Type, status and amount are carried as stored text so that a row which
/// no longer decodes can still be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub protocol: String,
    pub market: String,
    pub position_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_reason: Option<String>,
    pub token_unit: String,
    pub original_entry_date: Option<String>,
    pub entry_date: Option<String>,
    pub days_held: i64,
    pub holding_period_known: bool,
    pub current_value: Figure<Decimal>,
    pub pool_share_pct: Figure<f64>,
    pub actual_apr: Figure<f64>,
    pub actual_yield_pct: Figure<f64>,
    pub il_pct: Figure<f64>,
    pub il_value: Figure<Decimal>,
    pub price_ratio_delta_pct: Figure<f64>,
    pub net_gain_loss_pct: Figure<f64>,
    pub entry_price_ratio: Option<PriceRatio>,
    pub current_price_ratio: Figure<PriceRatio>,
    pub amount: String,
    pub token_a_amount: Figure<Decimal>,
    pub token_b_amount: Figure<Decimal>,
    pub events: Vec<EventView>,
}

/// A stored deposit or withdrawal as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventView {
    pub event_key: String,
    pub event_type: PositionEventType,
    pub amount_change: TokenAmount,
    pub amount_after: TokenAmount,
    pub price_ratio_at_event: Option<PriceRatio>,
    pub detected_at: i64,
    pub detected_date: String,
}

impl From<PositionEvent> for EventView {
    fn from(event: PositionEvent) -> Self {
        Self {
            event_key: event.event_key,
            event_type: event.event_type,
            amount_change: event.amount_change,
            amount_after: event.amount_after,
            price_ratio_at_event: event.price_ratio_at_event,
            detected_at: event.detected_at.as_ms(),
            detected_date: event.detected_at.day().to_iso_string(),
        }
    }
}

/// Builds reports from stored rows plus live market data.
///
/// Market lookups that fail degrade the affected figures to `unavailable`;
/// only store failures fail the report.
#[derive(Debug, Clone)]
pub struct ReportService {
    repo: Arc<Repository>,
    reserves: Arc<dyn ReserveSource>,
    rates: Arc<dyn RateSource>,
}

impl ReportService {
    pub fn new(
        repo: Arc<Repository>,
        reserves: Arc<dyn ReserveSource>,
        rates: Arc<dyn RateSource>,
    ) -> Self {
        Self {
            repo,
            reserves,
            rates,
        }
    }

    /// Reports for every stored position of `wallet`, in discovery order.
    ///
    /// Closed rows are omitted unless `include_closed`. Rows that fail to
    /// decode are still reported from their stored text, with every market
    /// figure `unavailable`.
    pub async fn position_report(
        &self,
        wallet: &WalletAddress,
        include_closed: bool,
        now: TimeMs,
    ) -> Result<Vec<PositionReport>, sqlx::Error> {
        let rows = self.repo.list_positions(wallet, include_closed).await?;
        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            match row.decode() {
                Ok(entry) => {
                    let events = self.events(&entry.key).await?;
                    reports.push(self.build(entry, events, now).await);
                }
                Err(reason) => {
                    warn!(
                        wallet = %row.key.wallet,
                        token_unit = %row.key.token_unit,
                        status = %row.status,
                        reason = %reason,
                        "Reporting undecodable position without market figures"
                    );
                    let events = self.events(&row.key).await.unwrap_or_else(|e| {
                        warn!(token_unit = %row.key.token_unit, error = %e, "Event history unreadable");
                        Vec::new()
                    });
                    reports.push(unreadable(row, events));
                }
            }
        }
        Ok(reports)
    }

    /// Event history of one pair, oldest first.
    pub async fn events(&self, key: &PositionKey) -> Result<Vec<EventView>, sqlx::Error> {
        Ok(self
            .repo
            .list_events(key)
            .await?
            .into_iter()
            .map(EventView::from)
            .collect())
    }

    async fn build(&self, entry: PositionEntry, events: Vec<EventView>, now: TimeMs) -> PositionReport {
        let (reserves, apr, exchange_rate) = futures::join!(
            self.fetch_reserves(&entry),
            self.fetch_apr(&entry),
            self.fetch_exchange_rate(&entry),
        );

        let current_price_ratio = reserves.as_ref().and_then(PriceRatio::from_reserves);
        let yields = compute_report(&entry, current_price_ratio, apr, now);
        let valuation = value_position(&entry, reserves.as_ref(), exchange_rate, yields.il_pct.get());

        PositionReport {
            protocol: entry.protocol,
            market: entry.market,
            position_type: entry.position_type.as_str().to_string(),
            status: entry.status.as_str().to_string(),
            frozen_reason: entry.frozen_reason,
            token_unit: entry.key.token_unit.to_string(),
            original_entry_date: entry.original_entry_date.map(|d| d.to_iso_string()),
            entry_date: entry.entry_date.map(|d| d.to_iso_string()),
            days_held: yields.days_held,
            holding_period_known: yields.holding_period_known,
            current_value: valuation.current_value,
            pool_share_pct: valuation.pool_share_pct,
            actual_apr: yields.actual_apr,
            actual_yield_pct: yields.actual_yield_pct,
            il_pct: yields.il_pct,
            il_value: valuation.il_value,
            price_ratio_delta_pct: yields.price_ratio_delta_pct,
            net_gain_loss_pct: yields.net_gain_loss_pct,
            entry_price_ratio: entry.entry_price_ratio,
            current_price_ratio: if entry.position_type.is_lp() {
                Figure::from_option(current_price_ratio)
            } else {
                Figure::NotApplicable
            },
            amount: entry.last_known_amount.to_canonical_string(),
            token_a_amount: valuation.token_a_amount,
            token_b_amount: valuation.token_b_amount,
            events,
        }
    }

    async fn fetch_reserves(&self, entry: &PositionEntry) -> Option<PoolReserves> {
        let pool_id = entry.pool_id.as_deref().filter(|_| entry.position_type.is_lp())?;
        match self.reserves.get_pool_reserves(pool_id).await {
            Ok(reserves) => Some(reserves),
            Err(e) => {
                warn!(pool_id, error = %e, "Reserve lookup failed; ratio unavailable");
                None
            }
        }
    }

    async fn fetch_apr(&self, entry: &PositionEntry) -> Option<f64> {
        match self.rates.get_current_apr(&entry.protocol, &entry.market).await {
            Ok(apr) => Some(apr),
            Err(e) => {
                warn!(
                    protocol = %entry.protocol,
                    market = %entry.market,
                    error = %e,
                    "APR lookup failed; yield unavailable"
                );
                None
            }
        }
    }

    async fn fetch_exchange_rate(&self, entry: &PositionEntry) -> Option<f64> {
        if entry.position_type != PositionType::Supply {
            return None;
        }
        self.rates
            .get_exchange_rate(&entry.protocol, &entry.market)
            .await
            .unwrap_or_else(|e| {
                warn!(market = %entry.market, error = %e, "Exchange rate lookup failed");
                None
            })
    }
}

/// Report for a row that does not decode: stored text only.
fn unreadable(row: PositionRow, events: Vec<EventView>) -> PositionReport {
    // an unknown type may still be a pool share
    let lp = PositionType::from_str(&row.position_type)
        .map(|t| t.is_lp())
        .unwrap_or(true);
    fn pool_figure<T>(lp: bool) -> Figure<T> {
        if lp {
            Figure::Unavailable
        } else {
            Figure::NotApplicable
        }
    }
    let entry_date = row.entry_date.map(|d| EpochDay::new(d).to_iso_string());

    PositionReport {
        protocol: row.protocol,
        market: row.market,
        position_type: row.position_type,
        status: row.status,
        frozen_reason: row.frozen_reason,
        token_unit: row.key.token_unit.to_string(),
        original_entry_date: row.original_entry_date.map(|d| EpochDay::new(d).to_iso_string()),
        entry_date,
        days_held: 0,
        holding_period_known: false,
        current_value: Figure::Unavailable,
        pool_share_pct: pool_figure(lp),
        actual_apr: Figure::Unavailable,
        actual_yield_pct: Figure::Unavailable,
        il_pct: pool_figure(lp),
        il_value: pool_figure(lp),
        price_ratio_delta_pct: pool_figure(lp),
        net_gain_loss_pct: Figure::Unavailable,
        entry_price_ratio: row.entry_price_ratio.and_then(PriceRatio::new),
        current_price_ratio: pool_figure(lp),
        amount: row.last_known_amount,
        token_a_amount: pool_figure(lp),
        token_b_amount: pool_figure(lp),
        events,
    }
}
