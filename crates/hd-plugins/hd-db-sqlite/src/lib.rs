//! # hd-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `hd-core` domain models, plus the transactional helper every
//! multi-statement operation runs through.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use hd_core::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

mod tickets;
mod tx;
mod users;

pub use tickets::SqliteTicketRepo;
pub use tx::{execute_in_transaction, TxFuture};
pub use users::SqliteUserRepo;

pub use sqlx::sqlite::SqlitePool;

/// Opens a pool against `url`, creating the database file when missing.
pub async fn connect(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| db_error("parse database url", e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|e| db_error("connect", e))?;

    tracing::info!(url, max_connections, "database pool ready");
    Ok(pool)
}

/// Applies the embedded migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Database(format!("migration failed: {e}")))
}

pub(crate) fn db_error(context: &str, err: sqlx::Error) -> AppError {
    AppError::Database(format!("{context}: {err}"))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// Timestamps are stored as fixed-width RFC 3339 text so lexical order matches time order.
pub(crate) fn to_db_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Database(format!("corrupt timestamp '{raw}': {e}")))
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use tempfile::TempDir;

    /// Fresh migrated database in its own directory. Keep the `TempDir` alive for the test's duration.
    pub async fn temp_pool() -> (TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("helpdesk.db").display());
        let pool = connect(&url, 4, Duration::from_secs(10)).await.unwrap();
        migrate(&pool).await.unwrap();
        (dir, pool)
    }

    pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_time_sorts_lexically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(1500);
        assert!(to_db_time(early) < to_db_time(late));
        assert_eq!(to_db_time(early).len(), to_db_time(late).len());
    }

    #[test]
    fn db_time_parses_back() {
        let ts = from_db_time("2024-05-01T10:20:30.000000Z").unwrap();
        assert_eq!(to_db_time(ts), "2024-05-01T10:20:30.000000Z");
        assert!(from_db_time("yesterday").is_err());
    }

    #[tokio::test]
    async fn migrations_create_every_table() {
        let (_dir, pool) = testutil::temp_pool().await;
        for table in ["users", "tickets", "images", "ticket_history", "counters"] {
            assert_eq!(testutil::count_rows(&pool, table).await, 0, "{table}");
        }
    }
}
