//! # Sale Totals
//!
//! ```text
//!   subtotal    = Σ line.total_price          (already net of line discounts)
//!   discount    = Σ line.discount             (for display and the sale record)
//!   tax         = subtotal × tax_rate         (half-up, integer cents)
//!   grand_total = subtotal + tax
//! ```

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{Line, TaxRate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
}

impl SaleTotals {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }
}

/// Computes totals from the current lines.
pub fn compute(lines: &[Line], tax_rate: TaxRate) -> SaleTotals {
    let subtotal: Money = lines.iter().map(Line::total_price).sum();
    let discount: Money = lines.iter().map(Line::discount).sum();
    let tax = subtotal.calculate_tax(tax_rate);

    SaleTotals {
        subtotal_cents: subtotal.cents(),
        discount_cents: discount.cents(),
        tax_cents: tax.cents(),
        grand_total_cents: (subtotal + tax).cents(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtotal_is_sum_of_line_totals() {
        let mut discounted = Line::new("b", "Bagel", 2, 10000);
        discounted.discount_cents = 2000;
        discounted.total_price_cents = 18000;
        let lines = vec![Line::new("a", "Coffee", 2, 1000), discounted];

        let totals = compute(&lines, TaxRate::zero());

        assert_eq!(totals.subtotal_cents, 2000 + 18000);
        assert_eq!(totals.discount_cents, 2000);
        assert_eq!(totals.grand_total_cents, totals.subtotal_cents);
    }

    #[test]
    fn test_tax_applies_to_net_subtotal() {
        let lines = vec![Line::new("a", "Coffee", 1, 1000)];
        let totals = compute(&lines, TaxRate::from_bps(825));

        assert_eq!(totals.tax_cents, 83);
        assert_eq!(totals.grand_total_cents, 1083);
    }

    #[test]
    fn test_empty_cart_is_zero() {
        assert_eq!(compute(&[], TaxRate::from_bps(1000)), SaleTotals::default());
    }
}
