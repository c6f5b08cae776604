//! In-memory index of active transactions.
//!
//! Holds only what the durable store already committed; the machine replaces
//! an entry after each successful write and evicts it when the transaction
//! leaves `active`.

use std::collections::HashMap;

use tokio::sync::RwLock;

use tally_core::TransactionCheckpoint;

#[derive(Debug, Default)]
pub struct ActiveIndex {
    entries: RwLock<HashMap<String, TransactionCheckpoint>>,
}

impl ActiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<TransactionCheckpoint> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn insert(&self, checkpoint: TransactionCheckpoint) {
        self.entries
            .write()
            .await
            .insert(checkpoint.id().to_string(), checkpoint);
    }

    pub async fn remove(&self, id: &str) -> Option<TransactionCheckpoint> {
        self.entries.write().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Sorted for stable output.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
