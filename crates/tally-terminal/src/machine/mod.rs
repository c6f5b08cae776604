//! # Transaction State Machine
//!
//! Drives one terminal's sales from first scan to finalized receipt.
//!
//! ## Steps and Statuses
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   items ◄──► pricing ◄──► payment ◄──► confirmation ◄──► printing      │
//! │                                                                         │
//! │   status overlay:                                                      │
//! │                                                                         │
//! │        ┌──── suspend ────┐                                              │
//! │        ▼                 │                                              │
//! │   suspended ── resume ─► active ── complete ──► completed              │
//! │        │                 │                                              │
//! │        └──── cancel ─────┴──── cancel / idle > 24h ──► cancelled       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write-Through
//! ```text
//! operation(id)
//!    │  1. load checkpoint (index first, then store)
//!    │  2. build StateUpdate
//!    ▼
//! DurableStore::update_state ──Err──► return StorageError, memory untouched
//!    │ Ok(committed)
//!    ▼
//! ActiveIndex ← committed (if still active, else evicted)
//! ```
//!
//! Calls for one transaction id are expected to be serialized by the caller;
//! the machine holds no per-id lock.

mod cart;
mod checkout;
mod lifecycle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};

use tally_core::receipt::ReceiptSequence;
use tally_core::{
    PricingContext, StateUpdate, StepLimits, TaxRate, TransactionCheckpoint, TransactionContext,
    TransactionState, TransactionStatus, DEFAULT_IDLE_EXPIRY_HOURS,
};

use crate::config::TerminalConfig;
use crate::error::{TerminalError, TerminalResult};
use crate::index::ActiveIndex;
use crate::pricing::PricingEngine;
use crate::store::DurableStore;

pub use lifecycle::SweepSummary;

// =============================================================================
// Settings
// =============================================================================

/// Per-terminal knobs the machine reads on every sale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineSettings {
    pub tax_rate: TaxRate,
    pub limits: StepLimits,
    /// Active or suspended transactions idle longer than this are cancelled.
    pub idle_expiry: chrono::Duration,
}

impl Default for MachineSettings {
    fn default() -> Self {
        MachineSettings {
            tax_rate: TaxRate::zero(),
            limits: StepLimits::default(),
            idle_expiry: chrono::Duration::hours(DEFAULT_IDLE_EXPIRY_HOURS),
        }
    }
}

impl MachineSettings {
    pub fn tax_rate(mut self, rate: TaxRate) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn limits(mut self, limits: StepLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn idle_expiry(mut self, idle: chrono::Duration) -> Self {
        self.idle_expiry = idle;
        self
    }
}

impl From<&TerminalConfig> for MachineSettings {
    fn from(config: &TerminalConfig) -> Self {
        MachineSettings {
            tax_rate: config.tax_rate(),
            limits: config.step_limits(),
            idle_expiry: config.idle_expiry(),
        }
    }
}

// =============================================================================
// Machine
// =============================================================================

/// The transaction state machine for one terminal.
///
/// ## Usage
/// ```rust,ignore
/// let store = Arc::new(InMemoryStore::new());
/// let engine = Arc::new(PricingEngine::new(store.clone()));
/// let machine = TransactionMachine::new(store, engine, MachineSettings::default());
///
/// let id = machine.start("cashier-1", "main", "register-1").await?;
/// machine.add_items(&id, vec![Line::new("coffee", "Coffee", 2, 1000)]).await?;
/// machine.set_payment(&id, PaymentBreakdown::cash(2000)).await?;
/// let sale = machine.complete_transaction(&id).await?;
/// ```
pub struct TransactionMachine {
    store: Arc<dyn DurableStore>,
    pricing: Arc<PricingEngine>,
    index: ActiveIndex,
    receipts: ReceiptSequence,
    settings: MachineSettings,
}

impl TransactionMachine {
    pub fn new(
        store: Arc<dyn DurableStore>,
        pricing: Arc<PricingEngine>,
        settings: MachineSettings,
    ) -> Self {
        TransactionMachine {
            store,
            pricing,
            index: ActiveIndex::new(),
            receipts: ReceiptSequence::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn pricing(&self) -> &Arc<PricingEngine> {
        &self.pricing
    }

    pub async fn get_state(&self, id: &str) -> TerminalResult<TransactionState> {
        Ok(self.load(id).await?.state)
    }

    pub async fn get_context(&self, id: &str) -> TerminalResult<TransactionContext> {
        Ok(self.load(id).await?.context)
    }

    /// Ids currently held in the in-memory index.
    pub async fn active_ids(&self) -> Vec<String> {
        self.index.ids().await
    }

    pub async fn is_indexed(&self, id: &str) -> bool {
        self.index.contains(id).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Memory first, then the durable store. Active checkpoints are re-cached.
    async fn load(&self, id: &str) -> TerminalResult<TransactionCheckpoint> {
        if let Some(checkpoint) = self.index.get(id).await {
            return Ok(checkpoint);
        }

        let checkpoint = self
            .store
            .get_state(id)
            .await?
            .ok_or_else(|| TerminalError::NotFound(id.to_string()))?;

        if checkpoint.status() == TransactionStatus::Active {
            debug!(transaction_id = %id, "Re-caching transaction from store");
            self.index.insert(checkpoint.clone()).await;
        }

        Ok(checkpoint)
    }

    /// Durable write first; only then does memory follow.
    async fn commit(&self, id: &str, update: StateUpdate) -> TerminalResult<TransactionCheckpoint> {
        let committed = self.store.update_state(id, &update).await.map_err(|e| {
            warn!(transaction_id = %id, error = %e, "Checkpoint write failed");
            TerminalError::from(e)
        })?;

        if committed.status() == TransactionStatus::Active {
            self.index.insert(committed.clone()).await;
        } else {
            self.index.remove(id).await;
        }

        Ok(committed)
    }

    /// Recomputes every line against the current cart.
    ///
    /// Minimum-spend rules look at the whole cart, so one line changing can
    /// move the discount on another.
    async fn reprice(&self, ctx: &mut TransactionContext, now: DateTime<Utc>) {
        let cart_subtotal_cents = ctx.gross_subtotal().cents();
        let branch_id = ctx.metadata.branch_id.clone();
        let customer_tier = ctx.metadata.customer_tier.clone();

        for line in ctx.lines.iter_mut() {
            let pricing_ctx = PricingContext {
                item: line.as_item(),
                quantity: line.quantity,
                branch_id: branch_id.clone(),
                customer_tier: customer_tier.clone(),
                at: now,
                cart_subtotal_cents,
            };

            let calculation = self.pricing.calculate_price(&pricing_ctx).await;
            line.apply_pricing(&calculation);
        }
    }
}

impl std::fmt::Debug for TransactionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionMachine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn require_status(
    checkpoint: &TransactionCheckpoint,
    expected: TransactionStatus,
    operation: &'static str,
) -> TerminalResult<()> {
    if checkpoint.status() != expected {
        return Err(TerminalError::InvalidStatus {
            id: checkpoint.id().to_string(),
            status: checkpoint.status(),
            operation,
        });
    }
    Ok(())
}

/// Compact record of the cart for the items-step snapshot.
fn items_snapshot(ctx: &TransactionContext) -> serde_json::Value {
    json!({
        "line_count": ctx.lines.len(),
        "unit_count": ctx.lines.iter().map(|l| l.quantity).sum::<i64>(),
        "gross_subtotal_cents": ctx.gross_subtotal().cents(),
    })
}
