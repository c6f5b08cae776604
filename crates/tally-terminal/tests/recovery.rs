//! Crash recovery and idle expiry.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::mpsc;

use tally_core::receipt::receipt_prefix_for;
use tally_core::{
    FinalizedSale, Line, PaymentBreakdown, StateUpdate, TransactionCheckpoint,
    TransactionStatus, TransactionStep, EXPIRED_REASON,
};
use tally_terminal::{
    DurableStore, InMemoryStore, MachineSettings, PricingEngine, TerminalError,
    TransactionMachine,
};

fn machine(store: &Arc<InMemoryStore>, settings: MachineSettings) -> TransactionMachine {
    let engine = Arc::new(PricingEngine::with_rules(vec![]));
    TransactionMachine::new(store.clone(), engine, settings)
}

/// Persists a checkpoint last touched `hours_ago`, as a previous process would have.
async fn persisted(store: &InMemoryStore, id: &str, hours_ago: i64) -> TransactionCheckpoint {
    let at = Utc::now() - Duration::hours(hours_ago);
    let mut checkpoint = TransactionCheckpoint::start(id, "cashier-1", "main", "register-1", at);
    checkpoint.context.lines.push(Line::new("coffee", "Coffee", 2, 1000));
    store.create_state(&checkpoint).await.unwrap();
    checkpoint
}

async fn set_status(store: &InMemoryStore, id: &str, status: TransactionStatus, hours_ago: i64) {
    let at = Utc::now() - Duration::hours(hours_ago);
    store
        .update_state(id, &StateUpdate::at(at).status(status))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_recover_expires_idle_transaction() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());
    persisted(&store, "t-old", 25).await;

    let recovered = machine.recover_transaction("t-old").await.unwrap();
    assert!(recovered.is_none());
    assert!(!machine.is_indexed("t-old").await);

    let state = machine.get_state("t-old").await.unwrap();
    assert_eq!(state.status, TransactionStatus::Cancelled);
    assert_eq!(state.cancel_reason.as_deref(), Some(EXPIRED_REASON));
    assert!(!machine.is_indexed("t-old").await);
}

#[tokio::test]
async fn test_recover_reinstates_active_transaction() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());
    persisted(&store, "t-1", 2).await;

    let state = machine.recover_transaction("t-1").await.unwrap().unwrap();
    assert_eq!(state.status, TransactionStatus::Active);
    assert_eq!(state.current_step, TransactionStep::Items);
    assert!(machine.is_indexed("t-1").await);

    // Work continues where it left off
    machine
        .set_payment("t-1", PaymentBreakdown::cash(2000))
        .await
        .unwrap();
    let sale = machine.complete_transaction("t-1").await.unwrap();
    assert_eq!(sale.total_amount_cents, 2000);
}

#[tokio::test]
async fn test_recover_leaves_suspended_out_of_memory() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());
    persisted(&store, "t-1", 3).await;
    set_status(&store, "t-1", TransactionStatus::Suspended, 2).await;

    let state = machine.recover_transaction("t-1").await.unwrap().unwrap();
    assert_eq!(state.status, TransactionStatus::Suspended);
    assert!(!machine.is_indexed("t-1").await);

    machine.resume_transaction("t-1").await.unwrap();
    assert!(machine.is_indexed("t-1").await);
}

#[tokio::test]
async fn test_recover_returns_terminal_states_untouched() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());
    persisted(&store, "t-done", 50).await;
    set_status(&store, "t-done", TransactionStatus::Completed, 48).await;
    let before = store.get_state("t-done").await.unwrap().unwrap();

    let state = machine.recover_transaction("t-done").await.unwrap().unwrap();
    assert_eq!(state, before.state);
    assert!(!machine.is_indexed("t-done").await);
}

#[tokio::test]
async fn test_recover_unknown_id() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());

    assert!(matches!(
        machine.recover_transaction("ghost").await,
        Err(TerminalError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_custom_idle_window() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(
        &store,
        MachineSettings::default().idle_expiry(Duration::hours(1)),
    );
    persisted(&store, "t-1", 2).await;

    assert!(machine.recover_transaction("t-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sweep_cancels_only_stale_active() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());

    persisted(&store, "stale-1", 30).await;
    persisted(&store, "stale-2", 25).await;
    persisted(&store, "fresh", 1).await;
    persisted(&store, "parked", 40).await;
    set_status(&store, "parked", TransactionStatus::Suspended, 30).await;

    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert_eq!(summary.cancelled, vec!["stale-1".to_string(), "stale-2".to_string()]);
    assert!(summary.failed.is_empty());

    for id in ["stale-1", "stale-2"] {
        let state = store.get_state(id).await.unwrap().unwrap().state;
        assert_eq!(state.status, TransactionStatus::Cancelled);
        assert_eq!(state.cancel_reason.as_deref(), Some(EXPIRED_REASON));
    }
    assert_eq!(
        store.get_state("fresh").await.unwrap().unwrap().status(),
        TransactionStatus::Active
    );
    assert_eq!(
        store.get_state("parked").await.unwrap().unwrap().status(),
        TransactionStatus::Suspended
    );

    // Nothing left to do
    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert!(summary.cancelled.is_empty());
}

#[tokio::test]
async fn test_sweep_with_window_beyond_calendar() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(
        &store,
        MachineSettings::default().idle_expiry(Duration::weeks(52 * 1_000_000)),
    );
    persisted(&store, "old", 30).await;

    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert!(summary.cancelled.is_empty());
    assert_eq!(
        store.get_state("old").await.unwrap().unwrap().status(),
        TransactionStatus::Active
    );
}

#[tokio::test]
async fn test_sweep_survives_write_failures() {
    let store = Arc::new(InMemoryStore::new());
    let machine = machine(&store, MachineSettings::default());
    persisted(&store, "stale-1", 30).await;
    persisted(&store, "stale-2", 26).await;

    store.fail_writes(true);
    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert!(summary.cancelled.is_empty());
    assert_eq!(summary.failed.len(), 2);

    store.fail_writes(false);
    let summary = machine.cleanup_expired_transactions().await.unwrap();
    assert_eq!(summary.cancelled.len(), 2);
}

#[tokio::test]
async fn test_sweep_loop_runs_until_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    let machine = Arc::new(machine(&store, MachineSettings::default()));
    persisted(&store, "stale", 30).await;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let handle = tokio::spawn(
        Arc::clone(&machine).run_expiry_sweep_loop(StdDuration::from_millis(10), shutdown_rx),
    );

    let mut cancelled = false;
    for _ in 0..100 {
        let status = store.get_state("stale").await.unwrap().unwrap().status();
        if status == TransactionStatus::Cancelled {
            cancelled = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(cancelled);

    shutdown_tx.send(()).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_restored_receipt_sequence_skips_issued_numbers() {
    let store = Arc::new(InMemoryStore::new());
    let now = Utc::now();
    let issued = format!("{}999990", receipt_prefix_for(now.date_naive()));

    // A sale the previous process finalized late in the receipt range
    store
        .append_finalized_sale(&FinalizedSale {
            id: "s-before".to_string(),
            transaction_id: "t-before".to_string(),
            receipt_number: issued.clone(),
            lines: vec![Line::new("coffee", "Coffee", 1, 1000)],
            payment: PaymentBreakdown::cash(1000),
            subtotal_cents: 1000,
            discount_cents: 0,
            tax_cents: 0,
            total_amount_cents: 1000,
            change_cents: 0,
            user_id: "cashier-1".to_string(),
            branch_id: "main".to_string(),
            device_id: "register-1".to_string(),
            started_at: now,
            completed_at: now,
        })
        .await
        .unwrap();

    let machine = machine(&store, MachineSettings::default());
    assert_eq!(
        machine.restore_receipt_sequence().await.unwrap(),
        Some(issued.clone())
    );

    persisted(&store, "t-1", 0).await;
    machine.recover_transaction("t-1").await.unwrap().unwrap();
    machine
        .set_payment("t-1", PaymentBreakdown::cash(2000))
        .await
        .unwrap();
    let sale = machine.complete_transaction("t-1").await.unwrap();

    assert_eq!(
        sale.receipt_number,
        format!("{}999991", receipt_prefix_for(now.date_naive()))
    );
    assert_eq!(store.sales().await.len(), 2);
}
