//! # Repository Module
//!
//! Database repository implementations for the terminal.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  SqliteStore (tally-terminal)                                          │
//! │       │                                                                 │
//! │       │  db.transactions().update(id, &update)                         │
//! │       ▼                                                                 │
//! │  TransactionRepository                                                 │
//! │  ├── insert(&self, checkpoint)                                         │
//! │  ├── get(&self, id)                                                    │
//! │  ├── update(&self, id, update)                                         │
//! │  ├── complete(&self, id, update, sale)                                 │
//! │  └── active_older_than(&self, cutoff)                                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`transaction::TransactionRepository`] - Checkpoints of transactions
//! - [`sale::SaleRepository`] - Finalized sales
//! - [`queue::SaleQueueRepository`] - Outbox for the back office
//! - [`pricing_rule::PricingRuleRepository`] - Pricing rule source

pub mod pricing_rule;
pub mod queue;
pub mod sale;
pub mod transaction;
