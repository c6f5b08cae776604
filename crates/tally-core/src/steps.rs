//! # Transaction Steps
//!
//! The working steps of a sale and the table of legal moves between them.
//!
//! ## Adjacency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   items ◄──► pricing ◄──► payment ◄──► confirmation ◄──► printing      │
//! │     ▲                                                                   │
//! │     └── initial step                                                    │
//! │                                                                         │
//! │   Forward moves go one step right, back moves one step left.           │
//! │   Anything else (items → payment, printing → items, x → x) fails       │
//! │   with CoreError::InvalidTransition.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};

/// A working step of an in-progress sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStep {
    Items,
    Pricing,
    Payment,
    Confirmation,
    Printing,
}

impl TransactionStep {
    pub const ALL: [TransactionStep; 5] = [
        TransactionStep::Items,
        TransactionStep::Pricing,
        TransactionStep::Payment,
        TransactionStep::Confirmation,
        TransactionStep::Printing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStep::Items => "items",
            TransactionStep::Pricing => "pricing",
            TransactionStep::Payment => "payment",
            TransactionStep::Confirmation => "confirmation",
            TransactionStep::Printing => "printing",
        }
    }

    /// Legal `to` steps from this step.
    pub fn successors(&self) -> &'static [TransactionStep] {
        use TransactionStep::*;

        match self {
            Items => &[Pricing],
            Pricing => &[Items, Payment],
            Payment => &[Pricing, Confirmation],
            Confirmation => &[Payment, Printing],
            Printing => &[Confirmation],
        }
    }

    pub fn can_transition_to(&self, to: TransactionStep) -> bool {
        self.successors().contains(&to)
    }
}

impl Default for TransactionStep {
    fn default() -> Self {
        TransactionStep::Items
    }
}

impl fmt::Display for TransactionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStep {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "step".to_string(),
                allowed: TransactionStep::ALL
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            })
    }
}

/// Checks a move against the adjacency table.
pub fn ensure_transition(from: TransactionStep, to: TransactionStep) -> CoreResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { from, to })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
