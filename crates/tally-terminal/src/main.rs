//! # Tally Terminal Host
//!
//! Opens the terminal database, warms the pricing cache, expires transactions
//! abandoned while the terminal was down, then keeps sweeping until Ctrl+C.
//!
//! ## Usage
//! ```bash
//! cargo run -p tally-terminal
//!
//! # Explicit config file
//! cargo run -p tally-terminal -- --config ./terminal.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use tally_db::{Database, DbConfig};
use tally_terminal::telemetry::init_tracing;
use tally_terminal::{
    MachineSettings, PricingEngine, SqliteStore, TerminalConfig, TransactionMachine,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = config_path_arg();
    let config = TerminalConfig::load_or_default(config_path);
    let db_path = config.database_path();

    info!(
        device_id = %config.device_id(),
        branch_id = %config.branch_id(),
        db = ?db_path,
        "Starting Tally POS terminal"
    );

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::new(
        DbConfig::new(&db_path).max_connections(config.database.max_connections),
    )
    .await?;
    let store = Arc::new(SqliteStore::new(db));

    let engine = Arc::new(PricingEngine::new(store.clone()));
    if let Err(e) = engine.initialize().await {
        // Prices fall back to base until the first successful load
        warn!(error = %e, "Pricing rules not loaded at startup");
    }

    let machine = Arc::new(TransactionMachine::new(
        store.clone(),
        engine,
        MachineSettings::from(&config),
    ));

    machine.restore_receipt_sequence().await?;

    let startup = machine.cleanup_expired_transactions().await?;
    info!(
        expired = startup.cancelled.len(),
        failed = startup.failed.len(),
        "Startup expiry sweep complete"
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let sweep = tokio::spawn(
        Arc::clone(&machine).run_expiry_sweep_loop(config.sweep_interval(), shutdown_rx),
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let _ = shutdown_tx.send(()).await;
    sweep.await?;
    store.database().close().await;

    info!("Terminal stopped");
    Ok(())
}

fn config_path_arg() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config" || a == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}
