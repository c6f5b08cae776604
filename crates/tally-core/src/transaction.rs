//! # Transaction Context and State
//!
//! The two halves of an in-flight sale:
//!
//! - [`TransactionContext`] - the mutable working set (lines, payment, metadata)
//! - [`TransactionState`] - the lifecycle record (status, step, snapshots)
//!
//! They are persisted together as a [`TransactionCheckpoint`] and changed
//! through a [`StateUpdate`], which both the durable store and the in-memory
//! index apply with the same code, so the two copies cannot drift.
//!
//! ## Status Overlay
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   start ──► ACTIVE ◄──────── resume ────────┐                          │
//! │               │ │                            │                          │
//! │               │ └──────── suspend ──────► SUSPENDED                     │
//! │               │                              │                          │
//! │        complete│          cancel / expiry    │                          │
//! │               ▼          ┌───────────────────┘                          │
//! │          COMPLETED       ▼                                              │
//! │                      CANCELLED          (both terminal)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::money::Money;
use crate::steps::TransactionStep;
use crate::types::{Line, PaymentBreakdown};

/// Reason recorded when an idle transaction is auto-cancelled.
pub const EXPIRED_REASON: &str = "Expired due to inactivity";

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Active,
    Suspended,
    Cancelled,
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Suspended => "suspended",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Completed => "completed",
        }
    }

    /// Completed and cancelled transactions never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Context
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub user_id: String,
    pub branch_id: String,
    pub device_id: String,
    /// Loyalty tier of the customer, when one has been identified.
    #[serde(default)]
    pub customer_tier: Option<String>,
}

/// The working set of one in-progress sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub id: String,
    pub current_step: TransactionStep,
    pub lines: Vec<Line>,
    pub payment: Option<PaymentBreakdown>,
    pub metadata: TransactionMetadata,
}

impl TransactionContext {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        branch_id: impl Into<String>,
        device_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        TransactionContext {
            id: id.into(),
            current_step: TransactionStep::Items,
            lines: Vec::new(),
            payment: None,
            metadata: TransactionMetadata {
                started_at: now,
                last_updated: now,
                user_id: user_id.into(),
                branch_id: branch_id.into(),
                device_id: device_id.into(),
                customer_tier: None,
            },
        }
    }

    pub fn line(&self, item_id: &str) -> Option<&Line> {
        self.lines.iter().find(|l| l.item_id == item_id)
    }

    /// Σ `quantity × unit_price` over all lines, before discounts.
    ///
    /// This is the "cart spend" that minimum-spend rules compare against.
    pub fn gross_subtotal(&self) -> Money {
        self.lines.iter().map(Line::line_base).sum()
    }

    /// Merges incoming lines by item identity.
    ///
    /// ## Behavior
    /// - Item already in cart: quantities are summed, total recomputed
    /// - New item: appended in scan order
    pub fn merge_lines(&mut self, incoming: Vec<Line>) {
        for line in incoming {
            match self.lines.iter_mut().find(|l| l.item_id == line.item_id) {
                Some(existing) => {
                    let quantity = existing.quantity.saturating_add(line.quantity);
                    existing.set_quantity(quantity);
                }
                None => {
                    let mut line = line;
                    let quantity = line.quantity;
                    line.set_quantity(quantity);
                    self.lines.push(line);
                }
            }
        }
    }

    /// Sets a line's quantity; `quantity <= 0` removes the line.
    ///
    /// Returns `false` when the item is not in the cart.
    pub fn set_line_quantity(&mut self, item_id: &str, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove_line(item_id);
        }

        match self.lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => {
                line.set_quantity(quantity);
                true
            }
            None => false,
        }
    }

    /// Returns `false` when the item is not in the cart.
    pub fn remove_line(&mut self, item_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.item_id != item_id);
        self.lines.len() != before
    }
}

// =============================================================================
// State
// =============================================================================

/// The persisted lifecycle record of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionState {
    pub id: String,
    pub status: TransactionStatus,
    pub current_step: TransactionStep,
    /// Latest snapshot recorded for each step.
    #[serde(default)]
    pub step_data: BTreeMap<TransactionStep, serde_json::Value>,
    /// Messages from the last blocking validation.
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransactionState {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        TransactionState {
            id: id.into(),
            status: TransactionStatus::Active,
            current_step: TransactionStep::Items,
            step_data: BTreeMap::new(),
            validation_errors: Vec::new(),
            cancel_reason: None,
            created_at: now,
            last_updated: now,
            completed_at: None,
        }
    }

    /// Idle for strictly longer than `idle` at `now`.
    pub fn is_idle_beyond(&self, now: DateTime<Utc>, idle: Duration) -> bool {
        now.signed_duration_since(self.last_updated) > idle
    }
}

// =============================================================================
// Checkpoint
// =============================================================================

/// State and context, persisted as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCheckpoint {
    pub state: TransactionState,
    pub context: TransactionContext,
}

impl TransactionCheckpoint {
    /// A fresh checkpoint at step `items`, status `active`.
    pub fn start(
        id: impl Into<String>,
        user_id: impl Into<String>,
        branch_id: impl Into<String>,
        device_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        TransactionCheckpoint {
            state: TransactionState::new(id.clone(), now),
            context: TransactionContext::new(id, user_id, branch_id, device_id, now),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.state.id
    }

    #[inline]
    pub fn status(&self) -> TransactionStatus {
        self.state.status
    }
}

// =============================================================================
// State Update
// =============================================================================

/// A partial update to a checkpoint.
///
/// ## Usage
/// ```rust
/// use chrono::Utc;
/// use tally_core::{StateUpdate, TransactionCheckpoint, TransactionStatus};
///
/// let mut checkpoint = TransactionCheckpoint::start("t-1", "u", "b", "d", Utc::now());
/// StateUpdate::at(Utc::now())
///     .status(TransactionStatus::Suspended)
///     .apply_to(&mut checkpoint);
/// assert_eq!(checkpoint.status(), TransactionStatus::Suspended);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub last_updated: DateTime<Utc>,
    pub status: Option<TransactionStatus>,
    pub current_step: Option<TransactionStep>,
    pub context: Option<TransactionContext>,
    pub snapshot: Option<(TransactionStep, serde_json::Value)>,
    pub validation_errors: Option<Vec<String>>,
    pub cancel_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StateUpdate {
    /// An update that only touches `last_updated`.
    pub fn at(now: DateTime<Utc>) -> Self {
        StateUpdate {
            last_updated: now,
            status: None,
            current_step: None,
            context: None,
            snapshot: None,
            validation_errors: None,
            cancel_reason: None,
            completed_at: None,
        }
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn step(mut self, step: TransactionStep) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn context(mut self, context: TransactionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn snapshot(mut self, step: TransactionStep, data: serde_json::Value) -> Self {
        self.snapshot = Some((step, data));
        self
    }

    pub fn validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = Some(errors);
        self
    }

    pub fn cancel_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancel_reason = Some(reason.into());
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Applies the update.
    ///
    /// The context's `current_step` and `last_updated` always follow the
    /// state's after an update.
    pub fn apply_to(&self, checkpoint: &mut TransactionCheckpoint) {
        if let Some(context) = &self.context {
            checkpoint.context = context.clone();
        }
        if let Some(status) = self.status {
            checkpoint.state.status = status;
        }
        if let Some(step) = self.current_step {
            checkpoint.state.current_step = step;
        }
        if let Some((step, data)) = &self.snapshot {
            checkpoint.state.step_data.insert(*step, data.clone());
        }
        if let Some(errors) = &self.validation_errors {
            checkpoint.state.validation_errors = errors.clone();
        }
        if let Some(reason) = &self.cancel_reason {
            checkpoint.state.cancel_reason = Some(reason.clone());
        }
        if let Some(at) = self.completed_at {
            checkpoint.state.completed_at = Some(at);
        }

        checkpoint.state.last_updated = self.last_updated;
        checkpoint.context.current_step = checkpoint.state.current_step;
        checkpoint.context.metadata.last_updated = self.last_updated;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TransactionContext {
        TransactionContext::new("t-1", "cashier", "main", "pos-01", Utc::now())
    }

    #[test]
    fn test_merge_sums_quantities_by_item() {
        let mut ctx = context();
        ctx.merge_lines(vec![Line::new("coffee", "Coffee", 2, 1000)]);
        ctx.merge_lines(vec![
            Line::new("coffee", "Coffee", 3, 1000),
            Line::new("bagel", "Bagel", 1, 350),
        ]);

        assert_eq!(ctx.lines.len(), 2);
        let coffee = ctx.line("coffee").unwrap();
        assert_eq!(coffee.quantity, 5);
        assert_eq!(coffee.total_price_cents, 5000);
        assert_eq!(ctx.gross_subtotal().cents(), 5350);
    }

    #[test]
    fn test_zero_quantity_removes_line() {
        let mut ctx = context();
        ctx.merge_lines(vec![Line::new("coffee", "Coffee", 2, 1000)]);

        assert!(ctx.set_line_quantity("coffee", 0));
        assert!(ctx.lines.is_empty());
        assert!(!ctx.set_line_quantity("coffee", 4));
    }

    #[test]
    fn test_remove_missing_line_reports_false() {
        let mut ctx = context();
        assert!(!ctx.remove_line("ghost"));
    }

    #[test]
    fn test_update_keeps_context_in_step_with_state() {
        let start = Utc::now();
        let mut checkpoint = TransactionCheckpoint::start("t-1", "u", "b", "d", start);
        let later = start + Duration::minutes(5);

        StateUpdate::at(later)
            .step(TransactionStep::Pricing)
            .snapshot(TransactionStep::Pricing, serde_json::json!({"subtotal_cents": 0}))
            .apply_to(&mut checkpoint);

        assert_eq!(checkpoint.state.current_step, TransactionStep::Pricing);
        assert_eq!(checkpoint.context.current_step, TransactionStep::Pricing);
        assert_eq!(checkpoint.context.metadata.last_updated, later);
        assert!(checkpoint
            .state
            .step_data
            .contains_key(&TransactionStep::Pricing));
    }

    #[test]
    fn test_idle_threshold_is_strict() {
        let now = Utc::now();
        let mut state = TransactionState::new("t-1", now - Duration::hours(24));
        assert!(!state.is_idle_beyond(now, Duration::hours(24)));

        state.last_updated = now - Duration::hours(25);
        assert!(state.is_idle_beyond(now, Duration::hours(24)));
    }

    #[test]
    fn test_checkpoint_json_round_trip_keeps_step_keys() {
        let mut checkpoint = TransactionCheckpoint::start("t-1", "u", "b", "d", Utc::now());
        StateUpdate::at(Utc::now())
            .snapshot(TransactionStep::Items, serde_json::json!([]))
            .apply_to(&mut checkpoint);

        let json = serde_json::to_string(&checkpoint).unwrap();
        assert!(json.contains("\"items\":[]"));
        let back: TransactionCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::Suspended.is_terminal());
    }
}
