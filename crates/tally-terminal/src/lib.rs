//! # tally-terminal: Transaction Core for One Tally POS Terminal
//!
//! The in-process library the terminal's UI shell drives.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Terminal                               │
//! │                                                                         │
//! │  UI shell (screens, printer, back-office sync)                         │
//! │       │  start / add_items / set_payment / complete_transaction ...     │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                tally-terminal (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   TransactionMachine ───────► PricingEngine (rule cache)        │   │
//! │  │     │      │                        │                           │   │
//! │  │     │   ActiveIndex                 │ RuleSource                │   │
//! │  │     │ DurableStore                  │                           │   │
//! │  │     ▼                               ▼                           │   │
//! │  │   SqliteStore / InMemoryStore ◄─────┘                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-db (SQLite)          tally-core (steps, validators, money)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_db::{Database, DbConfig};
//! use tally_terminal::{MachineSettings, PricingEngine, SqliteStore, TransactionMachine};
//!
//! let store = Arc::new(SqliteStore::new(Database::new(DbConfig::new("tally.db")).await?));
//! let engine = Arc::new(PricingEngine::new(store.clone()));
//! engine.initialize().await?;
//!
//! let machine = TransactionMachine::new(store, engine, MachineSettings::default());
//! let id = machine.start("cashier-1", "main", "register-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod index;
pub mod machine;
pub mod pricing;
pub mod store;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::TerminalConfig;
pub use error::{
    ConfigError, ErrorCode, ErrorResponse, StoreError, StoreResult, TerminalError, TerminalResult,
};
pub use machine::{MachineSettings, SweepSummary, TransactionMachine};
pub use pricing::{PricingEngine, StaticRuleSource};
pub use store::{DurableStore, InMemoryStore, RuleSource, SqliteStore};
