//! # Pricing Rules
//!
//! Rule matching and discount math. Pure: the rule cache and its loading live
//! in `tally-terminal`'s `PricingEngine`.
//!
//! ## Application Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line base = unit_price × quantity                     e.g. $200.00     │
//! │                                                                         │
//! │  rule A: 10% percentage   → 10% of $200.00 = $20.00                    │
//! │  rule B: $15 fixed amount → min($15, $200) = $15.00                    │
//! │                                                                         │
//! │  Every applicable rule is computed against the SAME base.               │
//! │  No compounding: B does not see A's reduced price.                      │
//! │                                                                         │
//! │  final = max(0, $200.00 − $20.00 − $15.00) = $165.00                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Applicability
//! A rule applies iff it is active, `valid_from <= at <= valid_to`, and every
//! one of its conditions holds. Conditions are a plain conjunction; there is
//! no OR or negation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::Item;

// =============================================================================
// Rule Definition
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is basis points (1000 = 10%).
    Percentage,
    /// `discount_value` is cents, capped at the line base.
    FixedAmount,
    /// Zeroes the line (buy-X-get-Y promotions).
    FreeItem,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::FixedAmount => "fixed_amount",
            DiscountType::FreeItem => "free_item",
        }
    }
}

/// One attribute comparison. A rule's conditions are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Sale is rung up at this branch.
    Branch { branch_id: String },
    /// Customer has been identified with this tier.
    CustomerTier { tier: String },
    /// Line quantity is at least this much.
    MinQuantity { quantity: i64 },
    /// Cart gross subtotal (before discounts) is at least this much.
    MinCartSpend { cents: i64 },
    /// Evaluation time falls inside this inclusive window.
    DateWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl RuleCondition {
    pub fn matches(&self, ctx: &PricingContext) -> bool {
        match self {
            RuleCondition::Branch { branch_id } => ctx.branch_id == *branch_id,
            RuleCondition::CustomerTier { tier } => ctx.customer_tier.as_deref() == Some(tier),
            RuleCondition::MinQuantity { quantity } => ctx.quantity >= *quantity,
            RuleCondition::MinCartSpend { cents } => ctx.cart_subtotal_cents >= *cents,
            RuleCondition::DateWindow { from, to } => *from <= ctx.at && ctx.at <= *to,
        }
    }
}

/// A dated, conditioned discount definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: String,
    pub name: String,
    /// Higher runs first in the applied-rule listing.
    pub priority: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PricingRule {
    pub fn is_applicable(&self, ctx: &PricingContext) -> bool {
        self.is_active
            && self.valid_from <= ctx.at
            && ctx.at <= self.valid_to
            && self.conditions.iter().all(|c| c.matches(ctx))
    }

    /// The amount this rule takes off `line_base`. Never more than the base.
    pub fn discount_for(&self, line_base: Money) -> Money {
        let base = line_base.non_negative();

        match self.discount_type {
            DiscountType::Percentage => {
                let bps = self.discount_value.clamp(0, 10_000) as u32;
                base.percentage_of(bps)
            }
            DiscountType::FixedAmount => Money::from_cents(self.discount_value.max(0)).min(base),
            DiscountType::FreeItem => base,
        }
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Everything the engine needs to price one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingContext {
    pub item: Item,
    pub quantity: i64,
    pub branch_id: String,
    pub customer_tier: Option<String>,
    pub at: DateTime<Utc>,
    /// Gross cart subtotal in cents, for minimum-spend rules.
    pub cart_subtotal_cents: i64,
}

impl PricingContext {
    /// `item.base_price × quantity`.
    pub fn line_base(&self) -> Money {
        self.item.base_price().multiply_quantity(self.quantity)
    }
}

/// One rule's contribution to a line, kept for receipts and audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub amount_cents: i64,
    pub priority: i32,
}

/// Result of pricing one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCalculation {
    /// Line base in cents (`unit_price × quantity`).
    pub base_price_cents: i64,
    pub final_price_cents: i64,
    /// Total taken off, capped at the base.
    pub discount_cents: i64,
    pub applied_rules: Vec<AppliedRule>,
    /// Rules could not be loaded; the base price was returned unchanged.
    #[serde(default)]
    pub degraded: bool,
}

impl PriceCalculation {
    /// Base price, no discounts.
    pub fn undiscounted(ctx: &PricingContext) -> Self {
        let base = ctx.line_base().non_negative();
        PriceCalculation {
            base_price_cents: base.cents(),
            final_price_cents: base.cents(),
            discount_cents: 0,
            applied_rules: Vec::new(),
            degraded: false,
        }
    }

    /// Base price, no discounts, flagged as a fallback.
    pub fn degraded(ctx: &PricingContext) -> Self {
        PriceCalculation {
            degraded: true,
            ..PriceCalculation::undiscounted(ctx)
        }
    }
}

/// Prices a line against a rule set.
///
/// All applicable rules are applied, each against the original line base;
/// the sum is subtracted once and the result clamped at zero.
pub fn calculate(rules: &[PricingRule], ctx: &PricingContext) -> PriceCalculation {
    let base = ctx.line_base().non_negative();

    let mut applicable: Vec<&PricingRule> =
        rules.iter().filter(|r| r.is_applicable(ctx)).collect();
    applicable.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

    let applied_rules: Vec<AppliedRule> = applicable
        .into_iter()
        .map(|rule| AppliedRule {
            rule_id: rule.id.clone(),
            name: rule.name.clone(),
            discount_type: rule.discount_type,
            discount_value: rule.discount_value,
            amount_cents: rule.discount_for(base).cents(),
            priority: rule.priority,
        })
        .collect();

    let requested: Money = applied_rules
        .iter()
        .map(|a| Money::from_cents(a.amount_cents))
        .sum();
    let discount = requested.min(base);

    PriceCalculation {
        base_price_cents: base.cents(),
        final_price_cents: (base - discount).non_negative().cents(),
        discount_cents: discount.cents(),
        applied_rules,
        degraded: false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule(id: &str, discount_type: DiscountType, value: i64) -> PricingRule {
        let now = Utc::now();
        PricingRule {
            id: id.to_string(),
            name: format!("Rule {id}"),
            priority: 0,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            discount_type,
            discount_value: value,
            conditions: Vec::new(),
            is_active: true,
        }
    }

    fn ctx(unit_cents: i64, quantity: i64) -> PricingContext {
        PricingContext {
            item: Item::new("sku-1", "Widget", unit_cents),
            quantity,
            branch_id: "main".to_string(),
            customer_tier: None,
            at: Utc::now(),
            cart_subtotal_cents: unit_cents * quantity,
        }
    }

    #[test]
    fn test_single_percentage_rule() {
        // base 100.00 × 2, 10% → 180.00
        let result = calculate(&[rule("ten", DiscountType::Percentage, 1000)], &ctx(10000, 2));

        assert_eq!(result.base_price_cents, 20000);
        assert_eq!(result.final_price_cents, 18000);
        assert_eq!(result.discount_cents, 2000);
        assert_eq!(result.applied_rules.len(), 1);
        assert_eq!(result.applied_rules[0].amount_cents, 2000);
    }

    #[test]
    fn test_stacked_rules_do_not_compound() {
        // 200.00 base, 10% and fixed 15.00 → 200 − 20 − 15 = 165
        let rules = [
            rule("ten", DiscountType::Percentage, 1000),
            rule("fifteen", DiscountType::FixedAmount, 1500),
        ];
        let result = calculate(&rules, &ctx(10000, 2));

        assert_eq!(result.final_price_cents, 16500);
        let amounts: Vec<i64> = result.applied_rules.iter().map(|a| a.amount_cents).collect();
        assert!(amounts.contains(&2000));
        assert!(amounts.contains(&1500));
    }

    #[test]
    fn test_fixed_amount_caps_at_base() {
        let result = calculate(&[rule("big", DiscountType::FixedAmount, 50000)], &ctx(300, 1));
        assert_eq!(result.applied_rules[0].amount_cents, 300);
        assert_eq!(result.final_price_cents, 0);
    }

    #[test]
    fn test_free_item_zeroes_line() {
        let result = calculate(&[rule("bogo", DiscountType::FreeItem, 0)], &ctx(450, 3));
        assert_eq!(result.final_price_cents, 0);
        assert_eq!(result.discount_cents, 1350);
    }

    #[test]
    fn test_total_discount_never_exceeds_base() {
        let rules = [
            rule("a", DiscountType::Percentage, 6000),
            rule("b", DiscountType::Percentage, 6000),
        ];
        let result = calculate(&rules, &ctx(1000, 1));

        assert_eq!(result.final_price_cents, 0);
        assert_eq!(result.discount_cents, 1000);
        // Itemized amounts still show what each rule asked for
        assert_eq!(result.applied_rules[0].amount_cents, 600);
    }

    #[test]
    fn test_validity_window_is_inclusive_and_enforced() {
        let mut r = rule("dated", DiscountType::Percentage, 1000);
        let c = ctx(1000, 1);

        r.valid_from = c.at;
        r.valid_to = c.at;
        assert!(r.is_applicable(&c));

        r.valid_to = c.at - Duration::seconds(1);
        r.valid_from = c.at - Duration::days(2);
        assert!(!r.is_applicable(&c));
    }

    #[test]
    fn test_inactive_rule_is_skipped() {
        let mut r = rule("off", DiscountType::Percentage, 1000);
        r.is_active = false;
        assert_eq!(calculate(&[r], &ctx(1000, 1)).final_price_cents, 1000);
    }

    #[test]
    fn test_conditions_are_anded() {
        let mut r = rule("gold-bulk", DiscountType::Percentage, 1000);
        r.conditions = vec![
            RuleCondition::CustomerTier {
                tier: "gold".to_string(),
            },
            RuleCondition::MinQuantity { quantity: 3 },
        ];

        let mut c = ctx(1000, 3);
        assert!(!r.is_applicable(&c), "tier missing");

        c.customer_tier = Some("gold".to_string());
        assert!(r.is_applicable(&c));

        c.quantity = 2;
        assert!(!r.is_applicable(&c), "quantity below minimum");
    }

    #[test]
    fn test_branch_and_spend_conditions() {
        let branch = RuleCondition::Branch {
            branch_id: "north".to_string(),
        };
        let spend = RuleCondition::MinCartSpend { cents: 5000 };

        let mut c = ctx(1000, 1);
        assert!(!branch.matches(&c));
        c.branch_id = "north".to_string();
        assert!(branch.matches(&c));

        assert!(!spend.matches(&c));
        c.cart_subtotal_cents = 5000;
        assert!(spend.matches(&c));
    }

    #[test]
    fn test_applied_rules_listed_by_priority() {
        let mut low = rule("low", DiscountType::FixedAmount, 100);
        low.priority = 1;
        let mut high = rule("high", DiscountType::FixedAmount, 100);
        high.priority = 9;

        let result = calculate(&[low, high], &ctx(1000, 1));
        assert_eq!(result.applied_rules[0].rule_id, "high");
        assert_eq!(result.applied_rules[1].rule_id, "low");
    }

    #[test]
    fn test_condition_json_shape() {
        let json = serde_json::to_value(RuleCondition::MinQuantity { quantity: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "min_quantity", "quantity": 2}));
    }

    #[test]
    fn test_degraded_returns_base() {
        let result = PriceCalculation::degraded(&ctx(250, 4));
        assert!(result.degraded);
        assert_eq!(result.final_price_cents, 1000);
        assert!(result.applied_rules.is_empty());
    }
}
