//! # Domain Types
//!
//! Cart and sale types shared by the state machine, the pricing engine and
//! the database layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────┐      │
//! │  │      Item       │   │      Line       │   │ PaymentBreakdown │      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────  │      │
//! │  │  id             │──►│  item_id        │   │  cash            │      │
//! │  │  base_price     │   │  quantity       │   │  card            │      │
//! │  │  category/brand │   │  unit_price     │   │  e_wallet        │      │
//! │  └─────────────────┘   │  discount       │   │  bank_transfer   │      │
//! │   (catalog, read-only) │  total_price    │   │  credit          │      │
//! │                        │  applied_rules  │   └──────────────────┘      │
//! │                        └─────────────────┘                              │
//! │                                 │ complete                              │
//! │                                 ▼                                       │
//! │                        ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │  FinalizedSale  │──►│ SaleQueueEntry  │       │
//! │                        │  (immutable)    │   │ (to back office)│       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A `Line` freezes name and unit price when the item is scanned. Catalog
//! changes after the scan never reach an in-flight sale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::pricing::{AppliedRule, PriceCalculation};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (825 bps = 8.25%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (config convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Item
// =============================================================================

/// A catalog item as supplied by the catalog collaborator.
///
/// Read-only here: the transaction core never writes items back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Price per unit in cents.
    pub base_price_cents: i64,
    pub category: Option<String>,
    pub brand: Option<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_price_cents: i64) -> Self {
        Item {
            id: id.into(),
            name: name.into(),
            base_price_cents,
            category: None,
            brand: None,
        }
    }

    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }
}

// =============================================================================
// Line
// =============================================================================

/// One cart entry.
///
/// ## Invariant
/// `total_price = max(0, quantity × unit_price − discount)`
///
/// `discount_cents` never exceeds the line base, so
/// `discount + total == quantity × unit_price` whenever the base is positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub item_id: String,
    /// Item name at time of scan (frozen).
    pub name: String,
    /// Catalog attributes at time of scan (frozen).
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub quantity: i64,
    /// Unit price in cents at time of scan (frozen).
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub total_price_cents: i64,
    /// Itemized discounts, for receipts and audit.
    #[serde(default)]
    pub applied_rules: Vec<AppliedRule>,
}

impl Line {
    /// Creates an undiscounted line.
    pub fn new(
        item_id: impl Into<String>,
        name: impl Into<String>,
        quantity: i64,
        unit_price_cents: i64,
    ) -> Self {
        Line {
            item_id: item_id.into(),
            name: name.into(),
            category: None,
            brand: None,
            quantity,
            unit_price_cents,
            discount_cents: 0,
            total_price_cents: Money::from_cents(unit_price_cents)
                .multiply_quantity(quantity)
                .non_negative()
                .cents(),
            applied_rules: Vec::new(),
        }
    }

    /// Creates a line from a catalog item, freezing its price and attributes.
    pub fn from_item(item: &Item, quantity: i64) -> Self {
        Line {
            category: item.category.clone(),
            brand: item.brand.clone(),
            ..Line::new(item.id.clone(), item.name.clone(), quantity, item.base_price_cents)
        }
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// `unit_price × quantity`, before any discount.
    #[inline]
    pub fn line_base(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    /// What `total_price` must be given the current quantity and discount.
    pub fn expected_total(&self) -> Money {
        (self.line_base() - self.discount()).non_negative()
    }

    /// Changes quantity and resets pricing to the undiscounted base.
    ///
    /// The state machine reprices right after; a stale discount computed for
    /// the old quantity must not survive.
    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
        self.discount_cents = 0;
        self.applied_rules.clear();
        self.total_price_cents = self.line_base().non_negative().cents();
    }

    /// Writes a pricing result onto the line.
    pub fn apply_pricing(&mut self, calculation: &PriceCalculation) {
        self.discount_cents = calculation.discount_cents;
        self.total_price_cents = calculation.final_price_cents;
        self.applied_rules = calculation.applied_rules.clone();
    }

    /// Rebuilds the catalog view of this line for the pricing engine.
    pub fn as_item(&self) -> Item {
        Item {
            id: self.item_id.clone(),
            name: self.name.clone(),
            base_price_cents: self.unit_price_cents,
            category: self.category.clone(),
            brand: self.brand.clone(),
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// Tender types accepted at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    EWallet,
    BankTransfer,
    /// Store credit / on-account.
    Credit,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::EWallet,
        PaymentMethod::BankTransfer,
        PaymentMethod::Credit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::EWallet => "e_wallet",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Credit => "credit",
        }
    }
}

/// Amount allocated to each payment method, in cents.
///
/// ## Invariant
/// No negative amounts. Enforced by
/// [`validate_payment_breakdown`](crate::validation::validate_payment_breakdown)
/// before a breakdown is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentBreakdown {
    pub cash_cents: i64,
    pub card_cents: i64,
    pub e_wallet_cents: i64,
    pub bank_transfer_cents: i64,
    pub credit_cents: i64,
}

impl PaymentBreakdown {
    /// Breakdown paid entirely in cash.
    pub fn cash(cents: i64) -> Self {
        PaymentBreakdown::default().with(PaymentMethod::Cash, cents)
    }

    /// Returns a copy with `method` set to `cents`.
    pub fn with(mut self, method: PaymentMethod, cents: i64) -> Self {
        match method {
            PaymentMethod::Cash => self.cash_cents = cents,
            PaymentMethod::Card => self.card_cents = cents,
            PaymentMethod::EWallet => self.e_wallet_cents = cents,
            PaymentMethod::BankTransfer => self.bank_transfer_cents = cents,
            PaymentMethod::Credit => self.credit_cents = cents,
        }
        self
    }

    pub fn amount(&self, method: PaymentMethod) -> Money {
        Money::from_cents(match method {
            PaymentMethod::Cash => self.cash_cents,
            PaymentMethod::Card => self.card_cents,
            PaymentMethod::EWallet => self.e_wallet_cents,
            PaymentMethod::BankTransfer => self.bank_transfer_cents,
            PaymentMethod::Credit => self.credit_cents,
        })
    }

    /// Each method with its amount, in a fixed order.
    pub fn entries(&self) -> impl Iterator<Item = (PaymentMethod, Money)> + '_ {
        PaymentMethod::ALL.into_iter().map(move |m| (m, self.amount(m)))
    }

    pub fn total(&self) -> Money {
        self.entries().map(|(_, amount)| amount).sum()
    }
}

// =============================================================================
// Finalized Sale
// =============================================================================

/// The immutable record written once, when a transaction completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedSale {
    pub id: String,
    pub transaction_id: String,
    /// `RCP-YYYYMMDD-######`
    pub receipt_number: String,
    pub lines: Vec<Line>,
    pub payment: PaymentBreakdown,
    /// Σ line totals (already net of line discounts).
    pub subtotal_cents: i64,
    /// Σ line discounts, for display.
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// Grand total: subtotal + tax.
    pub total_amount_cents: i64,
    /// Tendered minus grand total.
    pub change_cents: i64,
    pub user_id: String,
    pub branch_id: String,
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl FinalizedSale {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }
}

// =============================================================================
// Sale Queue
// =============================================================================

/// A finalized sale waiting to be picked up by the back-office collaborator.
///
/// Outbox pattern: written in the same database transaction as the sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleQueueEntry {
    pub id: String,
    pub sale_id: String,
    /// Full sale as JSON.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_percentage() {
        assert_eq!(TaxRate::from_percentage(8.25).bps(), 825);
        assert!(TaxRate::default().is_zero());
    }

    #[test]
    fn test_new_line_total_is_base() {
        let line = Line::new("coffee", "Coffee", 2, 1000);
        assert_eq!(line.total_price_cents, 2000);
        assert_eq!(line.discount_cents, 0);
        assert_eq!(line.expected_total(), line.total_price());
    }

    #[test]
    fn test_set_quantity_drops_stale_discount() {
        let mut line = Line::new("coffee", "Coffee", 2, 1000);
        line.discount_cents = 500;
        line.total_price_cents = 1500;

        line.set_quantity(3);

        assert_eq!(line.discount_cents, 0);
        assert_eq!(line.total_price_cents, 3000);
    }

    #[test]
    fn test_line_from_item_freezes_attributes() {
        let mut item = Item::new("tea", "Green Tea", 450);
        item.category = Some("beverages".to_string());

        let line = Line::from_item(&item, 4);
        assert_eq!(line.total_price_cents, 1800);
        assert_eq!(line.as_item(), item);
    }

    #[test]
    fn test_payment_breakdown_total() {
        let payment = PaymentBreakdown::cash(1500)
            .with(PaymentMethod::Card, 500)
            .with(PaymentMethod::EWallet, 250);

        assert_eq!(payment.total().cents(), 2250);
        assert_eq!(payment.amount(PaymentMethod::Card).cents(), 500);
        assert_eq!(payment.amount(PaymentMethod::Credit).cents(), 0);
    }

    #[test]
    fn test_payment_method_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        assert_eq!(PaymentMethod::EWallet.as_str(), "e_wallet");
    }
}
