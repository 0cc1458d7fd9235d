//! Position row operations for the repository.

use crate::domain::{
    EpochDay, PositionEntry, PositionKey, PositionStatus, PositionType, PriceRatio, TimeMs,
    TokenAmount, TokenUnit, WalletAddress,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::Repository;

/// A `positions` row as stored, before validation.
///
/// Kept raw so that a corrupted row can still be loaded and
/// frozen instead of failing at decode time.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub key: PositionKey,
    pub protocol: String,
    pub market: String,
    pub position_type: String,
    pub pool_id: Option<String>,
    pub token_decimals: i64,
    pub original_entry_date: Option<i64>,
    pub entry_date: Option<i64>,
    pub entry_price_ratio: Option<f64>,
    pub last_known_amount: String,
    pub last_amount_check: i64,
    pub status: String,
    pub frozen_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PositionRow {
    fn from_row(row: &SqliteRow) -> Self {
        PositionRow {
            key: PositionKey::new(
                WalletAddress::new(row.get::<String, _>("wallet")),
                TokenUnit::new(row.get::<String, _>("token_unit")),
            ),
            protocol: row.get("protocol"),
            market: row.get("market"),
            position_type: row.get("position_type"),
            pool_id: row.get("pool_id"),
            token_decimals: row.get("token_decimals"),
            original_entry_date: row.get("original_entry_date"),
            entry_date: row.get("entry_date"),
            entry_price_ratio: row.get("entry_price_ratio"),
            last_known_amount: row.get("last_known_amount"),
            last_amount_check: row.get("last_amount_check"),
            status: row.get("status"),
            frozen_reason: row.get("frozen_reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.status == PositionStatus::Frozen.as_str()
    }

    /// Parse into a typed entry. The error names the first malformed field.
    pub fn decode(&self) -> Result<PositionEntry, String> {
        let position_type = PositionType::from_str(&self.position_type)
            .map_err(|e| format!("position_type: {}", e))?;
        let status =
            PositionStatus::from_str(&self.status).map_err(|e| format!("status: {}", e))?;
        let last_known_amount = TokenAmount::from_str(&self.last_known_amount)
            .map_err(|e| format!("last_known_amount: {}", e))?;
        let entry_price_ratio = match self.entry_price_ratio {
            None => None,
            Some(raw) => Some(PriceRatio::new(raw).ok_or_else(|| {
                format!("entry_price_ratio: must be finite and > 0, got {}", raw)
            })?),
        };
        let token_decimals = u32::try_from(self.token_decimals)
            .map_err(|_| format!("token_decimals: out of range {}", self.token_decimals))?;

        Ok(PositionEntry {
            key: self.key.clone(),
            protocol: self.protocol.clone(),
            market: self.market.clone(),
            position_type,
            pool_id: self.pool_id.clone(),
            token_decimals,
            original_entry_date: self.original_entry_date.map(EpochDay::new),
            entry_date: self.entry_date.map(EpochDay::new),
            entry_price_ratio,
            last_known_amount,
            last_amount_check: TimeMs::new(self.last_amount_check),
            status,
            frozen_reason: self.frozen_reason.clone(),
            created_at: TimeMs::new(self.created_at),
            updated_at: TimeMs::new(self.updated_at),
        })
    }
}

const SELECT_POSITION: &str = r#"
    SELECT wallet, token_unit, protocol, market, position_type, pool_id, token_decimals,
           original_entry_date, entry_date, entry_price_ratio, last_known_amount,
           last_amount_check, status, frozen_reason, created_at, updated_at
    FROM positions
"#;

impl Repository {
    /// Load one position inside an open transaction.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn fetch_position_tx(
        &self,
        conn: &mut SqliteConnection,
        key: &PositionKey,
    ) -> Result<Option<PositionRow>, sqlx::Error> {
        let sql = format!("{} WHERE wallet = ? AND token_unit = ?", SELECT_POSITION);
        let row = sqlx::query(&sql)
            .bind(key.wallet.as_str())
            .bind(key.token_unit.as_str())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(PositionRow::from_row))
    }

    /// Load one position outside any transaction (reporting).
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_position(&self, key: &PositionKey) -> Result<Option<PositionRow>, sqlx::Error> {
        let sql = format!("{} WHERE wallet = ? AND token_unit = ?", SELECT_POSITION);
        let row = sqlx::query(&sql)
            .bind(key.wallet.as_str())
            .bind(key.token_unit.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(PositionRow::from_row))
    }

    /// Insert or fully overwrite a position row. `created_at` is kept from
    /// the first insert.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn upsert_position_tx(
        &self,
        conn: &mut SqliteConnection,
        entry: &PositionEntry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                wallet, token_unit, protocol, market, position_type, pool_id, token_decimals,
                original_entry_date, entry_date, entry_price_ratio, last_known_amount,
                last_amount_check, status, frozen_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(wallet, token_unit) DO UPDATE SET
                protocol = excluded.protocol,
                market = excluded.market,
                position_type = excluded.position_type,
                pool_id = excluded.pool_id,
                token_decimals = excluded.token_decimals,
                original_entry_date = excluded.original_entry_date,
                entry_date = excluded.entry_date,
                entry_price_ratio = excluded.entry_price_ratio,
                last_known_amount = excluded.last_known_amount,
                last_amount_check = excluded.last_amount_check,
                status = excluded.status,
                frozen_reason = excluded.frozen_reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entry.key.wallet.as_str())
        .bind(entry.key.token_unit.as_str())
        .bind(entry.protocol.as_str())
        .bind(entry.market.as_str())
        .bind(entry.position_type.as_str())
        .bind(entry.pool_id.as_deref())
        .bind(i64::from(entry.token_decimals))
        .bind(entry.original_entry_date.map(|d| d.as_i64()))
        .bind(entry.entry_date.map(|d| d.as_i64()))
        .bind(entry.entry_price_ratio.map(|r| r.value()))
        .bind(entry.last_known_amount.to_canonical_string())
        .bind(entry.last_amount_check.as_ms())
        .bind(entry.status.as_str())
        .bind(entry.frozen_reason.as_deref())
        .bind(entry.created_at.as_ms())
        .bind(entry.updated_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Mark a position frozen. Touches nothing but status, reason and `updated_at`.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn freeze_position(
        &self,
        key: &PositionKey,
        reason: &str,
        at: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET status = ?, frozen_reason = ?, updated_at = ?
            WHERE wallet = ? AND token_unit = ?
            "#,
        )
        .bind(PositionStatus::Frozen.as_str())
        .bind(reason)
        .bind(at.as_ms())
        .bind(key.wallet.as_str())
        .bind(key.token_unit.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All rows for a wallet, oldest first. Closed rows only when asked for;
    /// frozen rows are always included so they stay visible.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_positions(
        &self,
        wallet: &WalletAddress,
        include_closed: bool,
    ) -> Result<Vec<PositionRow>, sqlx::Error> {
        let sql = format!(
            "{} WHERE wallet = ? AND (? OR status != ?) ORDER BY created_at ASC, token_unit ASC",
            SELECT_POSITION
        );
        let rows = sqlx::query(&sql)
            .bind(wallet.as_str())
            .bind(include_closed)
            .bind(PositionStatus::Closed.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(PositionRow::from_row).collect())
    }
}
