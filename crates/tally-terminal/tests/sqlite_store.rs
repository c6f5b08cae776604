//! The machine over the SQLite adapter.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use tally_core::{
    DiscountType, Line, PaymentBreakdown, PricingRule, RuleCondition, TransactionCheckpoint,
    TransactionStatus, EXPIRED_REASON,
};
use tally_db::{Database, DbConfig};
use tally_terminal::{MachineSettings, PricingEngine, SqliteStore, TransactionMachine};

async fn in_memory() -> (Database, TransactionMachine) {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let machine = machine_over(&db).await;
    (db, machine)
}

async fn machine_over(db: &Database) -> TransactionMachine {
    let store = Arc::new(SqliteStore::new(db.clone()));
    let engine = Arc::new(PricingEngine::new(store.clone()));
    engine.initialize().await.unwrap();
    TransactionMachine::new(store, engine, MachineSettings::default())
}

fn gold_rule() -> PricingRule {
    let now = Utc::now();
    PricingRule {
        id: "gold-10".to_string(),
        name: "Gold members 10%".to_string(),
        priority: 20,
        valid_from: now - Duration::days(1),
        valid_to: now + Duration::days(30),
        discount_type: DiscountType::Percentage,
        discount_value: 1000,
        conditions: vec![RuleCondition::CustomerTier {
            tier: "gold".to_string(),
        }],
        is_active: true,
    }
}

#[tokio::test]
async fn test_completed_sale_is_stored_and_queued() {
    let (db, machine) = in_memory().await;

    let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
    machine
        .add_items(&id, vec![Line::new("coffee", "Coffee", 2, 1000)])
        .await
        .unwrap();
    machine
        .set_payment(&id, PaymentBreakdown::cash(2000))
        .await
        .unwrap();
    let sale = machine.complete_transaction(&id).await.unwrap();

    let stored = db
        .sales()
        .get_by_receipt_number(&sale.receipt_number)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, sale);
    assert_eq!(db.sale_queue().count_pending().await.unwrap(), 1);

    let state = machine.get_state(&id).await.unwrap();
    assert_eq!(state.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_cancelling_completed_sale_keeps_sale_row() {
    let (db, machine) = in_memory().await;

    let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
    machine
        .add_items(&id, vec![Line::new("coffee", "Coffee", 1, 1000)])
        .await
        .unwrap();
    machine
        .set_payment(&id, PaymentBreakdown::cash(1000))
        .await
        .unwrap();
    let sale = machine.complete_transaction(&id).await.unwrap();

    let state = machine.cancel_transaction(&id, "Void").await.unwrap();
    assert_eq!(state.status, TransactionStatus::Cancelled);

    let stored = db
        .sales()
        .get_by_transaction_id(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, sale);
    assert_eq!(db.sale_queue().count_pending().await.unwrap(), 1);
    assert_eq!(
        db.transactions()
            .count_by_status(TransactionStatus::Cancelled)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_rules_load_from_database() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    db.pricing_rules().upsert(&gold_rule()).await.unwrap();
    let machine = machine_over(&db).await;
    assert_eq!(machine.pricing().rule_count().await, 1);

    let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
    machine
        .add_items(&id, vec![Line::new("coffee", "Coffee", 1, 1000)])
        .await
        .unwrap();
    let ctx = machine.assign_customer_tier(&id, "gold").await.unwrap();

    assert_eq!(ctx.lines[0].total_price_cents, 900);
    assert_eq!(ctx.lines[0].applied_rules[0].rule_id, "gold-10");
}

#[tokio::test]
async fn test_suspend_resume_round_trip() {
    let (db, machine) = in_memory().await;

    let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
    machine
        .add_items(&id, vec![Line::new("tea", "Tea", 3, 800)])
        .await
        .unwrap();
    machine.suspend_transaction(&id).await.unwrap();

    assert_eq!(
        db.transactions()
            .count_by_status(TransactionStatus::Suspended)
            .await
            .unwrap(),
        1
    );

    machine.resume_transaction(&id).await.unwrap();
    let ctx = machine.get_context(&id).await.unwrap();
    assert_eq!(ctx.lines[0].quantity, 3);
}

#[tokio::test]
async fn test_sweep_over_sqlite() {
    let (db, machine) = in_memory().await;

    let stale = TransactionCheckpoint::start(
        "t-stale",
        "cashier-1",
        "main",
        "register-1",
        Utc::now() - Duration::hours(25),
    );
    db.transactions().insert(&stale).await.unwrap();

    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert_eq!(summary.cancelled, vec!["t-stale".to_string()]);

    let state = machine.get_state("t-stale").await.unwrap();
    assert_eq!(state.status, TransactionStatus::Cancelled);
    assert_eq!(state.cancel_reason.as_deref(), Some(EXPIRED_REASON));
}

#[tokio::test]
async fn test_transaction_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");

    let id = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let machine = machine_over(&db).await;

        let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
        machine
            .add_items(&id, vec![Line::new("coffee", "Coffee", 2, 1000)])
            .await
            .unwrap();
        machine
            .set_payment(&id, PaymentBreakdown::cash(2000))
            .await
            .unwrap();
        db.close().await;
        id
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let machine = machine_over(&db).await;
    assert!(machine.active_ids().await.is_empty());

    let state = machine.recover_transaction(&id).await.unwrap().unwrap();
    assert_eq!(state.status, TransactionStatus::Active);
    assert!(machine.is_indexed(&id).await);

    let ctx = machine.get_context(&id).await.unwrap();
    assert_eq!(ctx.lines[0].quantity, 2);
    assert_eq!(ctx.payment, Some(PaymentBreakdown::cash(2000)));

    let sale = machine.complete_transaction(&id).await.unwrap();
    assert_eq!(sale.total_amount_cents, 2000);
    db.close().await;
}

#[tokio::test]
async fn test_receipt_sequence_restored_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.db");

    let first = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let machine = machine_over(&db).await;
        assert_eq!(machine.restore_receipt_sequence().await.unwrap(), None);

        let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
        machine
            .add_items(&id, vec![Line::new("coffee", "Coffee", 1, 1000)])
            .await
            .unwrap();
        machine
            .set_payment(&id, PaymentBreakdown::cash(1000))
            .await
            .unwrap();
        let sale = machine.complete_transaction(&id).await.unwrap();
        db.close().await;
        sale.receipt_number
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let machine = machine_over(&db).await;
    assert_eq!(
        machine.restore_receipt_sequence().await.unwrap(),
        Some(first.clone())
    );

    let id = machine.start("cashier-1", "main", "register-1").await.unwrap();
    machine
        .add_items(&id, vec![Line::new("coffee", "Coffee", 1, 1000)])
        .await
        .unwrap();
    machine
        .set_payment(&id, PaymentBreakdown::cash(1000))
        .await
        .unwrap();
    let second = machine.complete_transaction(&id).await.unwrap().receipt_number;

    assert!(second > first, "{second} should follow {first}");
    assert_eq!(db.sales().count().await.unwrap(), 2);
    db.close().await;
}
