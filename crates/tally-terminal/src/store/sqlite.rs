//! SQLite-backed store over [`tally_db::Database`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use tally_core::receipt::receipt_prefix_for;
use tally_core::{FinalizedSale, PricingRule, StateUpdate, TransactionCheckpoint};
use tally_db::Database;

use crate::error::StoreResult;
use crate::store::{DurableStore, RuleSource};

/// The production adapter: one SQLite file per terminal.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        SqliteStore { db }
    }

    /// Direct access for the host (sale queue delivery, reporting).
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn create_state(&self, checkpoint: &TransactionCheckpoint) -> StoreResult<()> {
        self.db.transactions().insert(checkpoint).await?;
        Ok(())
    }

    async fn get_state(&self, id: &str) -> StoreResult<Option<TransactionCheckpoint>> {
        Ok(self.db.transactions().get(id).await?)
    }

    async fn update_state(
        &self,
        id: &str,
        update: &StateUpdate,
    ) -> StoreResult<TransactionCheckpoint> {
        Ok(self.db.transactions().update(id, update).await?)
    }

    async fn query_active_states_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<TransactionCheckpoint>> {
        let stale = self.db.transactions().active_older_than(cutoff).await?;
        debug!(count = stale.len(), %cutoff, "Queried stale active transactions");
        Ok(stale)
    }

    async fn append_finalized_sale(&self, sale: &FinalizedSale) -> StoreResult<()> {
        self.db.sales().append(sale).await?;
        Ok(())
    }

    async fn latest_receipt_number(&self, date: NaiveDate) -> StoreResult<Option<String>> {
        Ok(self
            .db
            .sales()
            .latest_receipt_number(&receipt_prefix_for(date))
            .await?)
    }

    /// State update, sale row and queue entry in one SQLite transaction.
    async fn complete_state(
        &self,
        id: &str,
        update: &StateUpdate,
        sale: &FinalizedSale,
    ) -> StoreResult<TransactionCheckpoint> {
        Ok(self.db.transactions().complete(id, update, sale).await?)
    }
}

#[async_trait]
impl RuleSource for SqliteStore {
    async fn load_active_pricing_rules(&self) -> StoreResult<Vec<PricingRule>> {
        Ok(self.db.pricing_rules().list_active().await?)
    }
}
