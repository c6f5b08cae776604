//! # tally-core: Pure Business Logic for Tally POS
//!
//! Everything a terminal needs to decide about a sale, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI shell (out of tree)                       │   │
//! │  │    Scan ──► Cart ──► Tender ──► Confirm ──► Receipt             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ in-process calls                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        tally-terminal: TransactionMachine, PricingEngine        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  steps  │ │ pricing │ │ totals  │ │validation│ │ receipt │  │   │
//! │  │   │adjacency│ │  rules  │ │  tax    │ │ reports │ │ numbers │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │         SQLite checkpoints, sales, sale queue, pricing rules    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Item, Line, PaymentBreakdown, FinalizedSale
//! - [`money`] - Money type with integer arithmetic
//! - [`steps`] - Working steps and their adjacency table
//! - [`transaction`] - Context, state and checkpoint updates
//! - [`pricing`] - Rule matching and discount math
//! - [`totals`] - Subtotal, discount, tax and grand total
//! - [`validation`] - Input validators and step validators
//! - [`receipt`] - Receipt number format and sequence
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tally_core::pricing::{self, DiscountType, PricingContext, PricingRule};
//! use tally_core::Item;
//!
//! let now = Utc::now();
//! let rule = PricingRule {
//!     id: "r-10".into(),
//!     name: "Ten off".into(),
//!     priority: 0,
//!     valid_from: now - chrono::Duration::days(1),
//!     valid_to: now + chrono::Duration::days(1),
//!     discount_type: DiscountType::Percentage,
//!     discount_value: 1000,
//!     conditions: vec![],
//!     is_active: true,
//! };
//! let ctx = PricingContext {
//!     item: Item::new("sku", "Widget", 10000),
//!     quantity: 2,
//!     branch_id: "main".into(),
//!     customer_tier: None,
//!     at: now,
//!     cart_subtotal_cents: 20000,
//! };
//!
//! assert_eq!(pricing::calculate(&[rule], &ctx).final_price_cents, 18000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod pricing;
pub mod receipt;
pub mod steps;
pub mod totals;
pub mod transaction;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{
    AppliedRule, DiscountType, PriceCalculation, PricingContext, PricingRule, RuleCondition,
};
pub use steps::TransactionStep;
pub use totals::SaleTotals;
pub use transaction::{
    StateUpdate, TransactionCheckpoint, TransactionContext, TransactionMetadata,
    TransactionState, TransactionStatus, EXPIRED_REASON,
};
pub use types::*;
pub use validation::{IssueCode, StepLimits, ValidationIssue, ValidationReport};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Hours of inactivity after which an open transaction is auto-cancelled.
pub const DEFAULT_IDLE_EXPIRY_HOURS: i64 = 24;
