//! # Pricing Engine
//!
//! Owns the terminal's resident copy of the active pricing rules.
//!
//! ## Rule Cache Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  initialize() / reload()                                               │
//! │       │  RuleSource::load_active_pricing_rules()                        │
//! │       ▼                                                                 │
//! │  RwLock<Option<Arc<Vec<PricingRule>>>>   ← written only here            │
//! │       │                                                                 │
//! │       │  calculate_price(ctx)  (every item scan, read lock only)        │
//! │       ▼                                                                 │
//! │  tally_core::pricing::calculate(&rules, ctx)                            │
//! │                                                                         │
//! │  Cache empty on first call? → inline reload                            │
//! │  Reload failed?             → base price, no discounts, warn!          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One engine per terminal process, shared by `Arc` with the state machine.
//! Tests build their own with an injected rule set.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use tally_core::pricing::calculate;
use tally_core::{PriceCalculation, PricingContext, PricingRule};

use crate::error::StoreResult;
use crate::store::RuleSource;

pub struct PricingEngine {
    source: Arc<dyn RuleSource>,
    rules: RwLock<Option<Arc<Vec<PricingRule>>>>,
}

impl PricingEngine {
    /// An engine that loads lazily from `source`.
    pub fn new(source: Arc<dyn RuleSource>) -> Self {
        PricingEngine {
            source,
            rules: RwLock::new(None),
        }
    }

    /// An engine pre-loaded with a fixed rule set.
    pub fn with_rules(rules: Vec<PricingRule>) -> Self {
        let source = Arc::new(StaticRuleSource::new(rules.clone()));
        PricingEngine {
            source,
            rules: RwLock::new(Some(Arc::new(rules))),
        }
    }

    /// Loads the active rule set. Returns how many rules are resident.
    pub async fn initialize(&self) -> StoreResult<usize> {
        let count = self.reload().await?;
        info!(rule_count = count, "Pricing engine initialized");
        Ok(count)
    }

    /// Replaces the cache with a fresh load. On error the old cache is kept.
    pub async fn reload(&self) -> StoreResult<usize> {
        let rules = self.source.load_active_pricing_rules().await?;
        let count = rules.len();
        *self.rules.write().await = Some(Arc::new(rules));
        debug!(rule_count = count, "Pricing rules loaded");
        Ok(count)
    }

    pub async fn is_loaded(&self) -> bool {
        self.rules.read().await.is_some()
    }

    pub async fn rule_count(&self) -> usize {
        self.rules.read().await.as_ref().map_or(0, |r| r.len())
    }

    /// Prices one line. Never fails.
    pub async fn calculate_price(&self, ctx: &PricingContext) -> PriceCalculation {
        match self.resident_rules().await {
            Some(rules) => calculate(&rules, ctx),
            None => PriceCalculation::degraded(ctx),
        }
    }

    /// The cached rules, loading them inline on a cold cache.
    async fn resident_rules(&self) -> Option<Arc<Vec<PricingRule>>> {
        if let Some(rules) = self.rules.read().await.as_ref() {
            return Some(Arc::clone(rules));
        }

        debug!("Pricing cache cold, reloading inline");
        match self.reload().await {
            Ok(_) => self.rules.read().await.clone(),
            Err(e) => {
                warn!(error = %e, "Pricing rules unavailable, using base prices");
                None
            }
        }
    }
}

impl std::fmt::Debug for PricingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricingEngine").finish_non_exhaustive()
    }
}

// =============================================================================
// Static Rule Source
// =============================================================================

/// A fixed rule set, for tests and hosts that push rules in directly.
#[derive(Debug, Clone, Default)]
pub struct StaticRuleSource {
    rules: Vec<PricingRule>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<PricingRule>) -> Self {
        StaticRuleSource { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRuleSource {
    async fn load_active_pricing_rules(&self) -> StoreResult<Vec<PricingRule>> {
        Ok(self.rules.iter().filter(|r| r.is_active).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::{Duration, Utc};
    use tally_core::{DiscountType, Item};

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
            conditions: vec![],
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

    #[tokio::test]
    async fn test_percentage_rule() {
        let engine = PricingEngine::with_rules(vec![rule("ten", DiscountType::Percentage, 1000)]);

        let calc = engine.calculate_price(&ctx(100, 2)).await;
        assert_eq!(calc.base_price_cents, 200);
        assert_eq!(calc.final_price_cents, 180);
        assert_eq!(calc.applied_rules.len(), 1);
        assert!(!calc.degraded);
    }

    #[tokio::test]
    async fn test_rules_do_not_compound() {
        let engine = PricingEngine::with_rules(vec![
            rule("ten", DiscountType::Percentage, 1000),
            rule("fifteen", DiscountType::FixedAmount, 15),
        ]);

        let calc = engine.calculate_price(&ctx(100, 2)).await;
        assert_eq!(calc.discount_cents, 35);
        assert_eq!(calc.final_price_cents, 165);
    }

    #[tokio::test]
    async fn test_cold_cache_reloads_inline() {
        let store = Arc::new(InMemoryStore::with_rules(vec![rule(
            "ten",
            DiscountType::Percentage,
            1000,
        )]));
        let engine = PricingEngine::new(store);
        assert!(!engine.is_loaded().await);

        let calc = engine.calculate_price(&ctx(100, 2)).await;
        assert_eq!(calc.final_price_cents, 180);
        assert!(engine.is_loaded().await);
        assert_eq!(engine.rule_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_load_degrades_to_base_price() {
        let store = Arc::new(InMemoryStore::with_rules(vec![rule(
            "ten",
            DiscountType::Percentage,
            1000,
        )]));
        store.fail_rule_loads(true);
        let engine = PricingEngine::new(store.clone());

        assert!(engine.initialize().await.is_err());

        let calc = engine.calculate_price(&ctx(100, 2)).await;
        assert!(calc.degraded);
        assert_eq!(calc.final_price_cents, 200);
        assert!(calc.applied_rules.is_empty());

        // Source back: the next call recovers on its own
        store.fail_rule_loads(false);
        let calc = engine.calculate_price(&ctx(100, 2)).await;
        assert!(!calc.degraded);
        assert_eq!(calc.final_price_cents, 180);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_rules() {
        let store = Arc::new(InMemoryStore::with_rules(vec![rule(
            "ten",
            DiscountType::Percentage,
            1000,
        )]));
        let engine = PricingEngine::new(store.clone());
        assert_eq!(engine.initialize().await.unwrap(), 1);

        store.fail_rule_loads(true);
        assert!(engine.reload().await.is_err());
        assert_eq!(engine.rule_count().await, 1);
        assert_eq!(engine.calculate_price(&ctx(100, 2)).await.final_price_cents, 180);
    }

    #[tokio::test]
    async fn test_static_source_skips_inactive() {
        let mut off = rule("off", DiscountType::FreeItem, 0);
        off.is_active = false;
        let engine = PricingEngine::new(Arc::new(StaticRuleSource::new(vec![
            off,
            rule("ten", DiscountType::Percentage, 1000),
        ])));

        assert_eq!(engine.initialize().await.unwrap(), 1);
    }
}
