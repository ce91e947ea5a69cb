//! Transactional execution helper.

use std::future::Future;
use std::pin::Pin;

use hd_core::error::Result;
use sqlx::sqlite::{SqliteConnection, SqlitePool};

use crate::db_error;

/// Future returned by a unit of work, borrowing the transaction's connection for `'c`.
pub type TxFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Runs `work` inside a transaction.
///
/// Commits when `work` returns `Ok` and surfaces any commit failure. Rolls back and
/// returns the original error unchanged when `work` returns `Err`. If `work` panics,
/// or the calling future is dropped mid-flight, the `sqlx::Transaction` guard is
/// dropped without a commit and rolls back, so no exit path leaves a transaction open.
///
/// ```ignore
/// let id = execute_in_transaction(&pool, move |conn| Box::pin(async move {
///     sqlx::query("INSERT INTO ...").execute(&mut *conn).await.map_err(|e| db_error("insert", e))?;
///     Ok(42)
/// })).await?;
/// ```
pub async fn execute_in_transaction<T, F>(pool: &SqlitePool, work: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
{
    let mut tx = pool.begin().await.map_err(|e| db_error("begin transaction", e))?;

    match work(&mut *tx).await {
        Ok(value) => {
            tx.commit().await.map_err(|e| db_error("commit transaction", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed after unit of work error");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{count_rows, temp_pool};
    use hd_core::error::AppError;

    async fn insert_user(conn: &mut SqliteConnection, email: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, created_at, updated_at) \
             VALUES ('tester', ?, 'x', 'user', '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
        )
        .bind(email)
        .execute(&mut *conn)
        .await
        .map_err(|e| db_error("insert user", e))?;
        Ok(())
    }

    async fn insert_then_panic(conn: &mut SqliteConnection) -> Result<()> {
        insert_user(conn, "a@example.com").await?;
        panic!("unit of work blew up");
    }

    #[tokio::test]
    async fn commits_on_success() {
        let (_dir, pool) = temp_pool().await;

        let value = execute_in_transaction(&pool, |conn| {
            Box::pin(async move {
                insert_user(conn, "a@example.com").await?;
                insert_user(conn, "b@example.com").await?;
                Ok::<_, AppError>(7)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(count_rows(&pool, "users").await, 2);
    }

    #[tokio::test]
    async fn rolls_back_and_returns_the_original_error() {
        let (_dir, pool) = temp_pool().await;

        let err = execute_in_transaction::<(), _>(&pool, |conn| {
            Box::pin(async move {
                insert_user(conn, "a@example.com").await?;
                Err::<(), _>(AppError::Validation("boom".into()))
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == "boom"));
        assert_eq!(count_rows(&pool, "users").await, 0);
    }

    #[tokio::test]
    async fn rolls_back_when_the_unit_of_work_panics() {
        let (_dir, pool) = temp_pool().await;

        let task_pool = pool.clone();
        let joined = tokio::spawn(async move {
            execute_in_transaction(&task_pool, |conn| Box::pin(insert_then_panic(conn))).await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(count_rows(&pool, "users").await, 0);

        // The pool is still usable afterwards; no connection is stuck inside a transaction.
        execute_in_transaction(&pool, |conn| Box::pin(async move { insert_user(conn, "b@example.com").await }))
            .await
            .unwrap();
        assert_eq!(count_rows(&pool, "users").await, 1);
    }

    #[tokio::test]
    async fn statement_failure_inside_work_rolls_back_earlier_statements() {
        let (_dir, pool) = temp_pool().await;

        let err = execute_in_transaction(&pool, |conn| {
            Box::pin(async move {
                insert_user(conn, "dup@example.com").await?;
                insert_user(conn, "dup@example.com").await
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(count_rows(&pool, "users").await, 0);
    }
}
