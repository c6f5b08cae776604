//! # Sale Queue Repository
//!
//! Outbox of finalized sales for the back-office collaborator.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  completeTransaction                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE transaction_states SET status = 'completed'         │   │
//! │  │  2. INSERT INTO finalized_sales                                │   │
//! │  │  3. INSERT INTO sale_queue (sale_id, payload)                  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← All succeed or all fail                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            DELIVERY WORKER (outside this workspace)             │   │
//! │  │                                                                 │   │
//! │  │  1. pending(limit)    WHERE delivered_at IS NULL               │   │
//! │  │  2. Send to back office                                        │   │
//! │  │  3. mark_delivered(id) or mark_failed(id, error)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::{FinalizedSale, SaleQueueEntry};

#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    sale_id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
}

impl From<QueueRow> for SaleQueueEntry {
    fn from(row: QueueRow) -> Self {
        SaleQueueEntry {
            id: row.id,
            sale_id: row.sale_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        }
    }
}

/// Repository for the sale queue.
#[derive(Debug, Clone)]
pub struct SaleQueueRepository {
    pool: SqlitePool,
}

impl SaleQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleQueueRepository { pool }
    }

    /// Undelivered entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<SaleQueueEntry>> {
        let rows: Vec<QueueRow> = sqlx::query_as(
            r#"
            SELECT id, sale_id, payload, attempts, last_error, created_at, delivered_at
            FROM sale_queue
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SaleQueueEntry::from).collect())
    }

    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE sale_queue SET delivered_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SaleQueueEntry", id));
        }

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sale_queue SET
                attempts = attempts + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SaleQueueEntry", id));
        }

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sale_queue WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Queues a sale on an open connection or transaction.
pub(crate) async fn enqueue_sale(
    conn: &mut SqliteConnection,
    sale: &FinalizedSale,
) -> DbResult<SaleQueueEntry> {
    debug!(sale_id = %sale.id, "Queuing sale for delivery");

    let entry = SaleQueueEntry {
        id: Uuid::new_v4().to_string(),
        sale_id: sale.id.clone(),
        payload: serde_json::to_string(sale)?,
        attempts: 0,
        last_error: None,
        created_at: Utc::now(),
        delivered_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO sale_queue (id, sale_id, payload, attempts, last_error, created_at, delivered_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.sale_id)
    .bind(&entry.payload)
    .bind(entry.attempts)
    .bind(&entry.last_error)
    .bind(entry.created_at)
    .bind(entry.delivered_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}
