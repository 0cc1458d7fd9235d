//! Repository layer for database operations.
//!
//! Methods are organized across submodules by table:
//! - `positions.rs` - one mutable row per (wallet, token unit)
//! - `events.rs` - the append-only deposit/withdrawal log
//!
//! Methods suffixed `_tx` run on a caller-supplied connection so that a
//! position upsert and its event append can share one transaction.

mod events;
mod positions;

pub use positions::PositionRow;

use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction that already holds SQLite's write lock.
    ///
    /// A deferred transaction that reads before writing fails with
    /// `SQLITE_BUSY` under WAL if another writer commits in between; taking
    /// the lock up front makes concurrent reconciliations queue on
    /// `busy_timeout` instead.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE positions SET updated_at = updated_at WHERE 0")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    /// Ping the database.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
