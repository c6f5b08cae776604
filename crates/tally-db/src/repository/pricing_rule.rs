//! # Pricing Rule Repository
//!
//! Local rule source for the terminal's pricing engine.
//!
//! ## Load Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  back office / seed binary                                              │
//! │       │  upsert()                                                       │
//! │       ▼                                                                 │
//! │  pricing_rules (SQLite)                                                 │
//! │       │  list_active()   ← is_active = 1, priority DESC                 │
//! │       ▼                                                                 │
//! │  PricingEngine cache (tally-terminal)                                   │
//! │       │  read-only on every scan; validity windows checked per call     │
//! │       ▼                                                                 │
//! │  tally_core::pricing::calculate                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{DiscountType, PricingRule, RuleCondition};

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    name: String,
    priority: i32,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    discount_type: DiscountType,
    discount_value: i64,
    conditions_json: String,
    is_active: bool,
}

impl RuleRow {
    fn into_rule(self) -> DbResult<PricingRule> {
        let conditions: Vec<RuleCondition> = serde_json::from_str(&self.conditions_json)?;

        Ok(PricingRule {
            id: self.id,
            name: self.name,
            priority: self.priority,
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            conditions,
            is_active: self.is_active,
        })
    }
}

/// Repository for pricing rules.
#[derive(Debug, Clone)]
pub struct PricingRuleRepository {
    pool: SqlitePool,
}

impl PricingRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PricingRuleRepository { pool }
    }

    /// Inserts or replaces a rule by id.
    pub async fn upsert(&self, rule: &PricingRule) -> DbResult<()> {
        debug!(rule_id = %rule.id, name = %rule.name, "Upserting pricing rule");

        if rule.valid_to < rule.valid_from {
            return Err(DbError::QueryFailed(format!(
                "rule {} ends before it starts",
                rule.id
            )));
        }

        let conditions_json = serde_json::to_string(&rule.conditions)?;

        sqlx::query(
            r#"
            INSERT INTO pricing_rules (
                id, name, priority, valid_from, valid_to,
                discount_type, discount_value, conditions_json, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                priority = excluded.priority,
                valid_from = excluded.valid_from,
                valid_to = excluded.valid_to,
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                conditions_json = excluded.conditions_json,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.valid_from)
        .bind(rule.valid_to)
        .bind(rule.discount_type)
        .bind(rule.discount_value)
        .bind(conditions_json)
        .bind(rule.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PricingRule>> {
        let row: Option<RuleRow> = sqlx::query_as(
            r#"
            SELECT id, name, priority, valid_from, valid_to,
                   discount_type, discount_value, conditions_json, is_active
            FROM pricing_rules
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RuleRow::into_rule).transpose()
    }

    /// Every rule flagged active, highest priority first.
    ///
    /// Validity windows are not filtered here; the engine checks them against
    /// the evaluation time of each calculation.
    pub async fn list_active(&self) -> DbResult<Vec<PricingRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"
            SELECT id, name, priority, valid_from, valid_to,
                   discount_type, discount_value, conditions_json, is_active
            FROM pricing_rules
            WHERE is_active = 1
            ORDER BY priority DESC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RuleRow::into_rule).collect()
    }

    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pricing_rules SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PricingRule", id));
        }

        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pricing_rules")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    fn rule(id: &str, priority: i32) -> PricingRule {
        let now = Utc::now();
        PricingRule {
            id: id.to_string(),
            name: format!("Rule {id}"),
            priority,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(30),
            discount_type: DiscountType::FixedAmount,
            discount_value: 150,
            conditions: vec![
                RuleCondition::Branch {
                    branch_id: "main".to_string(),
                },
                RuleCondition::MinQuantity { quantity: 2 },
            ],
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.pricing_rules();

        repo.upsert(&rule("low", 1)).await.unwrap();
        repo.upsert(&rule("high", 10)).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, "high");
        assert_eq!(active[0].conditions.len(), 2);
        assert_eq!(active[0].discount_type, DiscountType::FixedAmount);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.pricing_rules();

        let mut r = rule("r-1", 1);
        repo.upsert(&r).await.unwrap();
        r.discount_type = DiscountType::Percentage;
        r.discount_value = 1000;
        repo.upsert(&r).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let stored = repo.get_by_id("r-1").await.unwrap().unwrap();
        assert_eq!(stored.discount_type, DiscountType::Percentage);
        assert_eq!(stored.discount_value, 1000);
    }

    #[tokio::test]
    async fn test_deactivate_hides_rule() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.pricing_rules();

        repo.upsert(&rule("r-1", 1)).await.unwrap();
        repo.deactivate("r-1").await.unwrap();

        assert!(repo.list_active().await.unwrap().is_empty());
        assert!(matches!(
            repo.deactivate("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_inverted_window() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut r = rule("r-1", 1);
        r.valid_to = r.valid_from - Duration::seconds(1);

        assert!(db.pricing_rules().upsert(&r).await.is_err());
    }
}
