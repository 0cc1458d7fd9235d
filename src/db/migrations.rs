//! Database initialization: pragmas and schema.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// Bumped whenever `schema.sql` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) the SQLite database and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .after_connect(|conn, _meta| Box::pin(async move { configure_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!(db_path, schema_version = SCHEMA_VERSION, "Database ready");
    Ok(pool)
}

/// Apply `schema.sql`; every statement is `IF NOT EXISTS`, so this is safe on every start.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current: i64 = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await?
        .get(0);
    debug!(current, target_version = SCHEMA_VERSION, "Applying schema");

    for statement in include_str!("schema.sql").split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    if current < SCHEMA_VERSION {
        // PRAGMA does not accept bound parameters
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Per-connection pragmas. `foreign_keys` ties events to their position row.
async fn configure_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the mode actually set
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!(journal_mode, "SQLite connection configured");

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> String {
        dir.path().join("test.db").to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_init_db_creates_nested_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir
            .path()
            .join("nested/dir/positions.db")
            .to_string_lossy()
            .to_string();

        let pool = init_db(&path).await.expect("init_db failed");
        assert!(Path::new(&path).exists());

        let result: (i64,) = sqlx::query_as("SELECT 1")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }

    #[tokio::test]
    async fn test_schema_creates_tables() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        for table in ["positions", "position_events"] {
            let result: (String,) =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_one(&pool)
                    .await
                    .expect("query failed");
            assert_eq!(result.0, table);
        }

        let version: (i64,) = sqlx::query_as("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(version.0, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        apply_schema(&pool).await.expect("second schema run failed");

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_position%'",
        )
        .fetch_one(&pool)
        .await
        .expect("query failed");
        assert_eq!(result.0, 2);
    }

    #[tokio::test]
    async fn test_event_type_constraint() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        sqlx::query(
            "INSERT INTO positions (wallet, token_unit, protocol, market, position_type, \
             last_known_amount, last_amount_check, created_at, updated_at) \
             VALUES ('w', 't', 'p', 'm', 'lp', '1', 0, 0, 0)",
        )
        .execute(&pool)
        .await
        .expect("insert position failed");

        let bad = sqlx::query(
            "INSERT INTO position_events (event_key, wallet, token_unit, event_type, \
             amount_change, amount_after, detected_at) \
             VALUES ('evt:x', 'w', 't', 'mint', '1', '1', 0)",
        )
        .execute(&pool)
        .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_event_requires_position_row() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        let orphan = sqlx::query(
            "INSERT INTO position_events (event_key, wallet, token_unit, event_type, \
             amount_change, amount_after, detected_at) \
             VALUES ('evt:y', 'nobody', 't', 'deposit', '1', '1', 0)",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_pragmas_configured() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&db_path(&temp_dir)).await.expect("init_db failed");

        let result: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);

        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .expect("query failed");
        // WAL is best-effort; SQLite can fall back depending on the filesystem
        assert!(
            matches!(result.0.as_str(), "wal" | "delete"),
            "unexpected journal_mode: {}",
            result.0
        );
    }
}
