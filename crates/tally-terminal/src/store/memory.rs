//! In-memory store for tests and diskless hosts.
//!
//! Holds checkpoints, sales and rules behind one `RwLock` so every method is
//! atomic. Failure injection lets tests prove that a failed write leaves the
//! machine unchanged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use tally_core::receipt::receipt_prefix_for;
use tally_core::{
    FinalizedSale, PricingRule, StateUpdate, TransactionCheckpoint, TransactionStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{DurableStore, RuleSource};

#[derive(Debug, Default)]
struct Contents {
    states: HashMap<String, TransactionCheckpoint>,
    sales: Vec<FinalizedSale>,
    rules: Vec<PricingRule>,
}

impl Contents {
    fn check_sale_unique(&self, sale: &FinalizedSale) -> StoreResult<()> {
        let clash = self.sales.iter().find(|s| {
            s.id == sale.id
                || s.transaction_id == sale.transaction_id
                || s.receipt_number == sale.receipt_number
        });

        match clash {
            Some(existing) => Err(StoreError::Duplicate(format!(
                "sale for transaction {} ({})",
                existing.transaction_id, existing.receipt_number
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    contents: RwLock<Contents>,
    fail_writes: AtomicBool,
    fail_rule_loads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose rule source serves `rules`.
    pub fn with_rules(rules: Vec<PricingRule>) -> Self {
        InMemoryStore {
            contents: RwLock::new(Contents {
                rules,
                ..Contents::default()
            }),
            ..Self::default()
        }
    }

    pub async fn set_rules(&self, rules: Vec<PricingRule>) {
        self.contents.write().await.rules = rules;
    }

    /// While set, every write fails with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// While set, loading pricing rules fails.
    pub fn fail_rule_loads(&self, fail: bool) {
        self.fail_rule_loads.store(fail, Ordering::SeqCst);
    }

    pub async fn sales(&self) -> Vec<FinalizedSale> {
        self.contents.read().await.sales.clone()
    }

    pub async fn state_count(&self) -> usize {
        self.contents.read().await.states.len()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn create_state(&self, checkpoint: &TransactionCheckpoint) -> StoreResult<()> {
        self.check_writable()?;

        let mut contents = self.contents.write().await;
        if contents.states.contains_key(checkpoint.id()) {
            return Err(StoreError::Duplicate(checkpoint.id().to_string()));
        }
        contents
            .states
            .insert(checkpoint.id().to_string(), checkpoint.clone());
        Ok(())
    }

    async fn get_state(&self, id: &str) -> StoreResult<Option<TransactionCheckpoint>> {
        Ok(self.contents.read().await.states.get(id).cloned())
    }

    async fn update_state(
        &self,
        id: &str,
        update: &StateUpdate,
    ) -> StoreResult<TransactionCheckpoint> {
        self.check_writable()?;

        let mut contents = self.contents.write().await;
        let checkpoint = contents
            .states
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(id.to_string()))?;

        update.apply_to(checkpoint);
        Ok(checkpoint.clone())
    }

    async fn query_active_states_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<TransactionCheckpoint>> {
        let contents = self.contents.read().await;
        let mut stale: Vec<TransactionCheckpoint> = contents
            .states
            .values()
            .filter(|c| c.status() == TransactionStatus::Active && c.state.last_updated < cutoff)
            .cloned()
            .collect();

        stale.sort_by_key(|c| c.state.last_updated);
        Ok(stale)
    }

    async fn append_finalized_sale(&self, sale: &FinalizedSale) -> StoreResult<()> {
        self.check_writable()?;

        let mut contents = self.contents.write().await;
        contents.check_sale_unique(sale)?;
        contents.sales.push(sale.clone());
        Ok(())
    }

    async fn latest_receipt_number(&self, date: NaiveDate) -> StoreResult<Option<String>> {
        let prefix = receipt_prefix_for(date);
        Ok(self
            .contents
            .read()
            .await
            .sales
            .iter()
            .map(|s| &s.receipt_number)
            .filter(|r| r.starts_with(&prefix))
            .max()
            .cloned())
    }

    async fn complete_state(
        &self,
        id: &str,
        update: &StateUpdate,
        sale: &FinalizedSale,
    ) -> StoreResult<TransactionCheckpoint> {
        self.check_writable()?;

        let mut contents = self.contents.write().await;
        contents.check_sale_unique(sale)?;

        let checkpoint = contents
            .states
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing(id.to_string()))?;
        update.apply_to(checkpoint);
        let committed = checkpoint.clone();

        contents.sales.push(sale.clone());
        Ok(committed)
    }
}

#[async_trait]
impl RuleSource for InMemoryStore {
    async fn load_active_pricing_rules(&self) -> StoreResult<Vec<PricingRule>> {
        if self.fail_rule_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected rule load failure".to_string()));
        }

        let mut rules: Vec<PricingRule> = self
            .contents
            .read()
            .await
            .rules
            .iter()
            .filter(|r| r.is_active)
            .cloned()
            .collect();

        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }
}
