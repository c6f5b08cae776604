//! # Validation Module
//!
//! Two kinds of checks live here.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Input validators (this file)                                          │
//! │  ├── Run before a value enters a transaction context                   │
//! │  └── Fail fast with ValidationError (caller misuse, bad input)         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Step validators (steps.rs)                                            │
//! │  ├── Run against the whole context for the current step                │
//! │  └── Return a ValidationReport (business rules, rendered by the UI)    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Database (SQLite)                                                     │
//! │  └── NOT NULL / UNIQUE constraints                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_item_id, validate_payment_breakdown};
//! use tally_core::PaymentBreakdown;
//!
//! validate_item_id("COFFEE-12OZ").unwrap();
//! validate_payment_breakdown(&PaymentBreakdown::cash(2000)).unwrap();
//! ```

mod steps;

pub use steps::{
    validate_for_completion, validate_step, IssueCode, StepLimits, ValidationIssue,
    ValidationReport, EMPTY_CART_MESSAGE,
};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Line, PaymentBreakdown};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_ID_LEN: usize = 64;
const MAX_TIER_LEN: usize = 50;

/// Largest quantity one line may carry, in either direction.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Largest unit price accepted ($1,000,000.00).
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Largest amount accepted for one payment method ($10,000,000,000.00).
pub const MAX_TENDER_CENTS: i64 = 1_000_000_000_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an item identity.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 64 characters
pub fn validate_item_id(item_id: &str) -> ValidationResult<()> {
    let item_id = item_id.trim();

    if item_id.is_empty() {
        return Err(ValidationError::Required {
            field: "item_id".to_string(),
        });
    }

    if item_id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "item_id".to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a customer tier label; returns it trimmed.
pub fn validate_customer_tier(tier: &str) -> ValidationResult<String> {
    let tier = tier.trim();

    if tier.is_empty() {
        return Err(ValidationError::Required {
            field: "customer_tier".to_string(),
        });
    }

    if tier.len() > MAX_TIER_LEN {
        return Err(ValidationError::TooLong {
            field: "customer_tier".to_string(),
            max: MAX_TIER_LEN,
        });
    }

    Ok(tier.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
/// - At most [`MAX_UNIT_PRICE_CENTS`]
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());  // $10.99
/// assert!(validate_price_cents(0).is_ok());     // Free item
/// assert!(validate_price_cents(-100).is_err()); // Invalid
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price".to_string(),
        });
    }

    if cents > MAX_UNIT_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a line quantity against [`MAX_LINE_QUANTITY`].
///
/// Zero and negative values pass: the cart treats them as removals and the
/// items step validator reports any that remain.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if !(-MAX_LINE_QUANTITY..=MAX_LINE_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_LINE_QUANTITY,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a line before it is merged into a cart.
///
/// Non-positive quantities are left to the items step validator; only the
/// magnitude is bounded here.
pub fn validate_line(line: &Line) -> ValidationResult<()> {
    validate_item_id(&line.item_id)?;
    validate_price_cents(line.unit_price_cents)?;
    validate_quantity(line.quantity)
}

/// Validates a payment breakdown.
///
/// ## Rules
/// - No method may carry a negative amount
/// - No method may exceed [`MAX_TENDER_CENTS`]
/// - All zeros is accepted (the payment step validator reports the shortfall)
pub fn validate_payment_breakdown(payment: &PaymentBreakdown) -> ValidationResult<()> {
    let mut total = Money::zero();

    for (method, amount) in payment.entries() {
        if amount.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: method.as_str().to_string(),
            });
        }

        if amount.cents() > MAX_TENDER_CENTS {
            return Err(ValidationError::OutOfRange {
                field: method.as_str().to_string(),
                min: 0,
                max: MAX_TENDER_CENTS,
            });
        }

        total = total
            .checked_add(amount)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "payment".to_string(),
                min: 0,
                max: i64::MAX,
            })?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;

    #[test]
    fn test_validate_item_id() {
        assert!(validate_item_id("COFFEE-12OZ").is_ok());
        assert!(validate_item_id("").is_err());
        assert!(validate_item_id("   ").is_err());
        assert!(validate_item_id(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_customer_tier_trims() {
        assert_eq!(validate_customer_tier("  gold ").unwrap(), "gold");
        assert!(validate_customer_tier("").is_err());
    }

    #[test]
    fn test_validate_line() {
        assert!(validate_line(&Line::new("a", "Coffee", 2, 1000)).is_ok());
        assert!(validate_line(&Line::new("a", "Coffee", 0, 1000)).is_ok());
        assert!(validate_line(&Line::new("", "Coffee", 1, 1000)).is_err());
        assert!(validate_line(&Line::new("a", "Coffee", 1, -1)).is_err());
    }

    #[test]
    fn test_validate_line_bounds_magnitudes() {
        let huge_qty = Line::new("a", "Coffee", i64::MAX / 10, 1000);
        assert_eq!(
            validate_line(&huge_qty),
            Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: -MAX_LINE_QUANTITY,
                max: MAX_LINE_QUANTITY,
            })
        );

        let huge_price = Line::new("a", "Coffee", 1, i64::MAX);
        assert!(matches!(
            validate_line(&huge_price),
            Err(ValidationError::OutOfRange { .. })
        ));

        let at_limit = Line::new("a", "Coffee", MAX_LINE_QUANTITY, MAX_UNIT_PRICE_CENTS);
        assert!(validate_line(&at_limit).is_ok());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(0).is_ok());
        assert!(validate_quantity(-3).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
        assert!(validate_quantity(i64::MIN).is_err());
    }

    #[test]
    fn test_validate_payment_breakdown() {
        assert!(validate_payment_breakdown(&PaymentBreakdown::cash(2000)).is_ok());
        assert!(validate_payment_breakdown(&PaymentBreakdown::default()).is_ok());

        let bad = PaymentBreakdown::cash(2000).with(PaymentMethod::Card, -1);
        assert_eq!(
            validate_payment_breakdown(&bad),
            Err(ValidationError::MustNotBeNegative {
                field: "card".to_string()
            })
        );
    }

    #[test]
    fn test_validate_payment_breakdown_rejects_huge_amounts() {
        let huge = PaymentBreakdown::cash(i64::MAX).with(PaymentMethod::Card, 1);
        assert_eq!(
            validate_payment_breakdown(&huge),
            Err(ValidationError::OutOfRange {
                field: "cash".to_string(),
                min: 0,
                max: MAX_TENDER_CENTS,
            })
        );

        let every_method_at_limit = PaymentMethod::ALL
            .into_iter()
            .fold(PaymentBreakdown::default(), |p, m| p.with(m, MAX_TENDER_CENTS));
        assert!(validate_payment_breakdown(&every_method_at_limit).is_ok());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(825).is_ok());
        assert!(validate_tax_rate_bps(10000).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }
}
