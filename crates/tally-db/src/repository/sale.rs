//! # Sale Repository
//!
//! Write-once storage for finalized sales.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMPLETE                                                           │
//! │     └── TransactionRepository::complete()                              │
//! │         ├── insert_sale()      → finalized_sales                       │
//! │         └── enqueue_sale()     → sale_queue   (same SQLite txn)        │
//! │                                                                         │
//! │  2. READ                                                               │
//! │     └── get_by_receipt_number() / get_by_transaction_id()              │
//! │                                                                         │
//! │  There is no update or delete: a finalized sale is never mutated.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::queue::enqueue_sale;
use tally_core::FinalizedSale;

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    sale_json: String,
}

impl SaleRow {
    fn into_sale(self) -> DbResult<FinalizedSale> {
        Ok(serde_json::from_str(&self.sale_json)?)
    }
}

/// Repository for finalized sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Writes a sale and its queue entry in one SQLite transaction.
    pub async fn append(&self, sale: &FinalizedSale) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        insert_sale(&mut tx, sale).await?;
        enqueue_sale(&mut tx, sale).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_receipt_number(&self, receipt_number: &str) -> DbResult<Option<FinalizedSale>> {
        let row: Option<SaleRow> =
            sqlx::query_as("SELECT sale_json FROM finalized_sales WHERE receipt_number = ?1")
                .bind(receipt_number)
                .fetch_optional(&self.pool)
                .await?;

        row.map(SaleRow::into_sale).transpose()
    }

    pub async fn get_by_transaction_id(&self, transaction_id: &str) -> DbResult<Option<FinalizedSale>> {
        let row: Option<SaleRow> =
            sqlx::query_as("SELECT sale_json FROM finalized_sales WHERE transaction_id = ?1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(SaleRow::into_sale).transpose()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM finalized_sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Highest receipt number starting with `prefix`.
    pub async fn latest_receipt_number(&self, prefix: &str) -> DbResult<Option<String>> {
        let receipt: Option<String> = sqlx::query_scalar(
            "SELECT receipt_number FROM finalized_sales WHERE receipt_number LIKE ?1 \
             ORDER BY receipt_number DESC LIMIT 1",
        )
        .bind(format!("{prefix}%"))
        .fetch_optional(&self.pool)
        .await?;

        Ok(receipt)
    }

    /// Σ total_amount_cents over all finalized sales.
    pub async fn total_amount_cents(&self) -> DbResult<i64> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(total_amount_cents) FROM finalized_sales")
                .fetch_one(&self.pool)
                .await?;

        Ok(total.unwrap_or(0))
    }
}

/// Inserts the sale row on an open connection or transaction.
pub(crate) async fn insert_sale(conn: &mut SqliteConnection, sale: &FinalizedSale) -> DbResult<()> {
    debug!(id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

    let sale_json = serde_json::to_string(sale)?;

    sqlx::query(
        r#"
        INSERT INTO finalized_sales (
            id, transaction_id, receipt_number,
            subtotal_cents, discount_cents, tax_cents, total_amount_cents, change_cents,
            sale_json, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.transaction_id)
    .bind(&sale.receipt_number)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.tax_cents)
    .bind(sale.total_amount_cents)
    .bind(sale.change_cents)
    .bind(sale_json)
    .bind(sale.completed_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
