//! Append-only event log operations for the repository.
//!
//! There is deliberately no update or delete here.

use crate::domain::{
    PositionEvent, PositionEventType, PositionKey, PriceRatio, TimeMs, TokenAmount,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::Repository;

fn decode_error(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn event_from_row(key: &PositionKey, row: &SqliteRow) -> Result<PositionEvent, sqlx::Error> {
    let event_type: String = row.get("event_type");
    let amount_change: String = row.get("amount_change");
    let amount_after: String = row.get("amount_after");
    let ratio: Option<f64> = row.get("price_ratio_at_event");

    Ok(PositionEvent {
        event_key: row.get("event_key"),
        key: key.clone(),
        event_type: PositionEventType::from_str(&event_type).map_err(decode_error)?,
        amount_change: TokenAmount::from_str(&amount_change)
            .map_err(|e| decode_error(e.to_string()))?,
        amount_after: TokenAmount::from_str(&amount_after)
            .map_err(|e| decode_error(e.to_string()))?,
        price_ratio_at_event: ratio.and_then(PriceRatio::new),
        detected_at: TimeMs::new(row.get("detected_at")),
    })
}

impl Repository {
    /// Append an event inside an open transaction.
    ///
    /// Returns `false` when an event with the same key already exists.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_event_tx(
        &self,
        conn: &mut SqliteConnection,
        event: &PositionEvent,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO position_events (
                event_key, wallet, token_unit, event_type, amount_change,
                amount_after, price_ratio_at_event, detected_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(event_key) DO NOTHING
            "#,
        )
        .bind(event.event_key.as_str())
        .bind(event.key.wallet.as_str())
        .bind(event.key.token_unit.as_str())
        .bind(event.event_type.as_str())
        .bind(event.amount_change.to_canonical_string())
        .bind(event.amount_after.to_canonical_string())
        .bind(event.price_ratio_at_event.map(|r| r.value()))
        .bind(event.detected_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Events for one pair, ascending by detection time.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row is malformed.
    pub async fn list_events(&self, key: &PositionKey) -> Result<Vec<PositionEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT event_key, event_type, amount_change, amount_after,
                   price_ratio_at_event, detected_at
            FROM position_events
            WHERE wallet = ? AND token_unit = ?
            ORDER BY detected_at ASC, id ASC
            "#,
        )
        .bind(key.wallet.as_str())
        .bind(key.token_unit.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| event_from_row(key, row)).collect()
    }

    /// Number of events recorded for one pair.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_events(&self, key: &PositionKey) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        self.count_events_tx(&mut *conn, key).await
    }

    /// Same as [`Repository::count_events`], on an open transaction.
    pub async fn count_events_tx(
        &self,
        conn: &mut SqliteConnection,
        key: &PositionKey,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM position_events WHERE wallet = ? AND token_unit = ?",
        )
        .bind(key.wallet.as_str())
        .bind(key.token_unit.as_str())
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.get::<i64, _>("n"))
    }
}
