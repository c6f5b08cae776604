//! # Durable Store
//!
//! The persistence collaborator of the state machine.
//!
//! ## Adapters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    DurableStore / RuleSource                            │
//! │                                                                         │
//! │  TransactionMachine ──► Arc<dyn DurableStore>                          │
//! │  PricingEngine      ──► Arc<dyn RuleSource>                            │
//! │                              │                                          │
//! │            ┌─────────────────┴──────────────────┐                       │
//! │            ▼                                    ▼                       │
//! │  ┌───────────────────┐               ┌───────────────────┐              │
//! │  │   SqliteStore     │               │  InMemoryStore    │              │
//! │  │   (tally-db)      │               │  (tests, hosts    │              │
//! │  │   survives crash  │               │   without disk)   │              │
//! │  └───────────────────┘               └───────────────────┘              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method is one logical commit: when it returns `Err`, nothing was
//! written.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use tally_core::{FinalizedSale, PricingRule, StateUpdate, TransactionCheckpoint};

use crate::error::StoreResult;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Crash-surviving storage for transaction checkpoints and finalized sales.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_state(&self, checkpoint: &TransactionCheckpoint) -> StoreResult<()>;

    async fn get_state(&self, id: &str) -> StoreResult<Option<TransactionCheckpoint>>;

    /// Applies a partial update and returns the committed checkpoint.
    async fn update_state(&self, id: &str, update: &StateUpdate)
        -> StoreResult<TransactionCheckpoint>;

    /// Active checkpoints whose `last_updated` is before `cutoff`.
    async fn query_active_states_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<TransactionCheckpoint>>;

    /// Appends an immutable sale and queues it for the back office.
    async fn append_finalized_sale(&self, sale: &FinalizedSale) -> StoreResult<()>;

    /// Highest receipt number issued on `date`, if any.
    async fn latest_receipt_number(&self, date: NaiveDate) -> StoreResult<Option<String>>;

    /// Appends the sale and applies the completing update.
    ///
    /// Adapters that can do both in one transaction should override this.
    async fn complete_state(
        &self,
        id: &str,
        update: &StateUpdate,
        sale: &FinalizedSale,
    ) -> StoreResult<TransactionCheckpoint> {
        self.append_finalized_sale(sale).await?;
        self.update_state(id, update).await
    }
}

/// Where the pricing engine loads its active rule set from.
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn load_active_pricing_rules(&self) -> StoreResult<Vec<PricingRule>>;
}
