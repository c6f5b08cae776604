//! # Transaction Checkpoint Repository
//!
//! Durable copy of every transaction's state and context.
//!
//! ## Row Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transaction_states                                                     │
//! │                                                                         │
//! │  id │ status │ current_step │ last_updated_ms │ state_json │ context_json│
//! │  ───┴────────┴──────────────┴─────────────────┴────────────┴────────────│
//! │        ▲           ▲               ▲                                    │
//! │        │           │               └── range-scanned by the sweep       │
//! │        └───────────┴── mirrored out of state_json for querying          │
//! │                                                                         │
//! │  state_json and context_json are the source of truth; the scalar       │
//! │  columns are rewritten from them on every write.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Partial Updates
//! `update` is read-modify-write inside one SQLite transaction: the row is
//! loaded, the [`StateUpdate`] applied, and the row written back before commit.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::queue::enqueue_sale;
use crate::repository::sale::insert_sale;
use tally_core::{FinalizedSale, StateUpdate, TransactionCheckpoint, TransactionStatus};

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    state_json: String,
    context_json: String,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> DbResult<TransactionCheckpoint> {
        Ok(TransactionCheckpoint {
            state: serde_json::from_str(&self.state_json)?,
            context: serde_json::from_str(&self.context_json)?,
        })
    }
}

/// Repository for transaction checkpoints.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a new checkpoint. Fails with `UniqueViolation` if the id exists.
    pub async fn insert(&self, checkpoint: &TransactionCheckpoint) -> DbResult<()> {
        debug!(transaction_id = %checkpoint.id(), "Inserting transaction checkpoint");

        let state_json = serde_json::to_string(&checkpoint.state)?;
        let context_json = serde_json::to_string(&checkpoint.context)?;

        sqlx::query(
            r#"
            INSERT INTO transaction_states (
                id, status, current_step, last_updated_ms,
                state_json, context_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(checkpoint.id())
        .bind(checkpoint.state.status)
        .bind(checkpoint.state.current_step)
        .bind(checkpoint.state.last_updated.timestamp_millis())
        .bind(state_json)
        .bind(context_json)
        .bind(checkpoint.state.created_at)
        .bind(checkpoint.state.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, checkpoint.id()),
            other => other,
        })?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<TransactionCheckpoint>> {
        let mut conn = self.pool.acquire().await?;
        fetch_checkpoint(&mut conn, id).await
    }

    /// Applies a partial update and returns the resulting checkpoint.
    pub async fn update(&self, id: &str, update: &StateUpdate) -> DbResult<TransactionCheckpoint> {
        let mut tx = self.pool.begin().await?;

        let checkpoint = apply_update(&mut tx, id, update).await?;

        tx.commit().await?;

        debug!(
            transaction_id = %id,
            status = %checkpoint.state.status,
            step = %checkpoint.state.current_step,
            "Checkpoint updated"
        );
        Ok(checkpoint)
    }

    /// Completes a transaction in one SQLite transaction.
    ///
    /// ```text
    /// BEGIN
    ///   UPDATE transaction_states  (status = completed, ...)
    ///   INSERT INTO finalized_sales
    ///   INSERT INTO sale_queue
    /// COMMIT   ← all three or none
    /// ```
    pub async fn complete(
        &self,
        id: &str,
        update: &StateUpdate,
        sale: &FinalizedSale,
    ) -> DbResult<TransactionCheckpoint> {
        let mut tx = self.pool.begin().await?;

        let checkpoint = apply_update(&mut tx, id, update).await?;
        insert_sale(&mut tx, sale).await?;
        enqueue_sale(&mut tx, sale).await?;

        tx.commit().await?;

        debug!(
            transaction_id = %id,
            receipt_number = %sale.receipt_number,
            "Transaction completed and sale queued"
        );
        Ok(checkpoint)
    }

    /// Active checkpoints whose last update is strictly before `cutoff`.
    pub async fn active_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<TransactionCheckpoint>> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            r#"
            SELECT state_json, context_json
            FROM transaction_states
            WHERE status = ?1 AND last_updated_ms < ?2
            ORDER BY last_updated_ms ASC
            "#,
        )
        .bind(TransactionStatus::Active)
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }

    pub async fn count_by_status(&self, status: TransactionStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transaction_states WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Connection-level helpers (shared with completion)
// =============================================================================

async fn fetch_checkpoint(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<TransactionCheckpoint>> {
    let row: Option<CheckpointRow> = sqlx::query_as(
        "SELECT state_json, context_json FROM transaction_states WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(CheckpointRow::into_checkpoint).transpose()
}

async fn apply_update(
    conn: &mut SqliteConnection,
    id: &str,
    update: &StateUpdate,
) -> DbResult<TransactionCheckpoint> {
    let mut checkpoint = fetch_checkpoint(conn, id)
        .await?
        .ok_or_else(|| DbError::not_found("Transaction", id))?;

    update.apply_to(&mut checkpoint);

    let state_json = serde_json::to_string(&checkpoint.state)?;
    let context_json = serde_json::to_string(&checkpoint.context)?;

    sqlx::query(
        r#"
        UPDATE transaction_states SET
            status = ?2,
            current_step = ?3,
            last_updated_ms = ?4,
            state_json = ?5,
            context_json = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(checkpoint.state.status)
    .bind(checkpoint.state.current_step)
    .bind(checkpoint.state.last_updated.timestamp_millis())
    .bind(state_json)
    .bind(context_json)
    .bind(checkpoint.state.last_updated)
    .execute(&mut *conn)
    .await?;

    Ok(checkpoint)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use tally_core::{Line, PaymentBreakdown, TransactionStep};

    async fn repo() -> (Database, TransactionRepository) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.transactions();
        (db, repo)
    }

    fn checkpoint(id: &str, at: DateTime<Utc>) -> TransactionCheckpoint {
        TransactionCheckpoint::start(id, "cashier-1", "main", "dev-1", at)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_db, repo) = repo().await;
        let cp = checkpoint("t-1", Utc::now());

        repo.insert(&cp).await.unwrap();

        assert_eq!(repo.get("t-1").await.unwrap(), Some(cp));
        assert_eq!(repo.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let (_db, repo) = repo().await;
        let cp = checkpoint("t-1", Utc::now());

        repo.insert(&cp).await.unwrap();
        let err = repo.insert(&cp).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_applies_partial_fields() {
        let (_db, repo) = repo().await;
        let start = Utc::now();
        let cp = checkpoint("t-1", start);
        repo.insert(&cp).await.unwrap();

        let mut context = cp.context.clone();
        context.lines.push(Line::new("coffee", "Coffee", 2, 1000));
        context.payment = Some(PaymentBreakdown::cash(2000));

        let later = start + Duration::seconds(5);
        let updated = repo
            .update(
                "t-1",
                &StateUpdate::at(later)
                    .step(TransactionStep::Payment)
                    .context(context),
            )
            .await
            .unwrap();

        assert_eq!(updated.state.current_step, TransactionStep::Payment);
        assert_eq!(updated.context.current_step, TransactionStep::Payment);
        assert_eq!(updated.state.last_updated, later);
        assert_eq!(updated.state.status, TransactionStatus::Active);

        let reloaded = repo.get("t-1").await.unwrap().unwrap();
        assert_eq!(reloaded, updated);
        assert_eq!(reloaded.context.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (_db, repo) = repo().await;
        let err = repo
            .update("nope", &StateUpdate::at(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_active_older_than_filters_status_and_age() {
        let (_db, repo) = repo().await;
        let now = Utc::now();

        repo.insert(&checkpoint("stale", now - Duration::hours(25)))
            .await
            .unwrap();
        repo.insert(&checkpoint("fresh", now - Duration::hours(1)))
            .await
            .unwrap();

        let suspended = checkpoint("parked", now - Duration::hours(30));
        repo.insert(&suspended).await.unwrap();
        repo.update(
            "parked",
            &StateUpdate::at(now - Duration::hours(30)).status(TransactionStatus::Suspended),
        )
        .await
        .unwrap();

        let stale = repo
            .active_older_than(now - Duration::hours(24))
            .await
            .unwrap();

        let ids: Vec<&str> = stale.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["stale"]);
        assert_eq!(
            repo.count_by_status(TransactionStatus::Suspended).await.unwrap(),
            1
        );
    }
}
