//! # Terminal Errors
//!
//! Every failure the state machine can report to the UI shell.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Tally POS                              │
//! │                                                                         │
//! │  UI shell                    TransactionMachine                         │
//! │  ────────                    ──────────────────                         │
//! │                                                                         │
//! │  complete(id)                                                           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  TerminalResult<FinalizedSale>                                   │  │
//! │  │         │                                                        │  │
//! │  │  DurableStore failed? ── StoreError ──────────┐                  │  │
//! │  │         │                                     │                  │  │
//! │  │  Step validators failed? ── ValidationReport ─┼─► TerminalError  │  │
//! │  │         │                                     │        │         │  │
//! │  │  Wrong status / step? ── InvalidStatus ───────┘        │         │  │
//! │  │         │                                              ▼         │  │
//! │  │  Success ─────────────────────────────────────► ErrorResponse   │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                   { code, message }     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed operation never leaves partial state behind: the durable write
//! happens first and the in-memory copy is only replaced once it succeeds.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use tally_core::{
    CoreError, IssueCode, TransactionStatus, TransactionStep, ValidationError, ValidationReport,
};
use tally_db::DbError;

// =============================================================================
// Store Error
// =============================================================================

/// Failure of a durable store or rule source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("No stored transaction: {0}")]
    Missing(String),

    #[error("Already stored: {0}")]
    Duplicate(String),

    /// The backing store refused or could not accept the operation.
    ///
    /// ## When This Occurs
    /// - Injected write failures in tests
    /// - A host adapter's backend is offline
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Terminal Error
// =============================================================================

/// Errors returned by [`crate::TransactionMachine`] operations.
#[derive(Debug, Error)]
pub enum TerminalError {
    /// No transaction with this id in memory or in the durable store.
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Requested step is not adjacent to the current one.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStep,
        to: TransactionStep,
    },

    /// Blocking validation errors prevented the operation.
    ///
    /// ## When This Occurs
    /// - Completing an empty cart
    /// - Completing with tendered < grand total
    #[error("Validation failed: {}", .0.error_messages().join("; "))]
    ValidationFailed(ValidationReport),

    /// The transaction's status does not allow this operation.
    ///
    /// ## When This Occurs
    /// - Adding items to a suspended or completed transaction
    /// - Resuming a transaction that is not suspended
    #[error("Transaction {id} is {status}; cannot {operation}")]
    InvalidStatus {
        id: String,
        status: TransactionStatus,
        operation: &'static str,
    },

    #[error("Item {item_id} is not in transaction {id}")]
    LineNotFound { id: String, item_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// No receipt number is left for today; the sale stays active.
    #[error("Receipt numbers exhausted for {0}")]
    ReceiptsExhausted(NaiveDate),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<CoreError> for TerminalError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransition { from, to } => {
                TerminalError::InvalidTransition { from, to }
            }
            CoreError::ReceiptSequenceExhausted { date } => TerminalError::ReceiptsExhausted(date),
            CoreError::Validation(e) => TerminalError::InvalidInput(e),
        }
    }
}

impl From<DbError> for TerminalError {
    fn from(err: DbError) -> Self {
        TerminalError::Storage(StoreError::Database(err))
    }
}

pub type TerminalResult<T> = Result<T, TerminalError>;

// =============================================================================
// Error Response
// =============================================================================

/// Machine-readable error codes for the UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    InvalidTransition,
    ValidationFailed,
    /// Validation failed specifically because tendered < grand total.
    InsufficientPayment,
    InvalidStatus,
    LineNotFound,
    InvalidInput,
    ReceiptsExhausted,
    StorageError,
}

impl TerminalError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TerminalError::NotFound(_) => ErrorCode::NotFound,
            TerminalError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            TerminalError::ValidationFailed(report)
                if report.has_error(IssueCode::InsufficientPayment) =>
            {
                ErrorCode::InsufficientPayment
            }
            TerminalError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            TerminalError::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            TerminalError::LineNotFound { .. } => ErrorCode::LineNotFound,
            TerminalError::InvalidInput(_) => ErrorCode::InvalidInput,
            TerminalError::ReceiptsExhausted(_) => ErrorCode::ReceiptsExhausted,
            TerminalError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

/// What the UI shell receives when an operation fails.
///
/// ```json
/// {
///   "code": "INSUFFICIENT_PAYMENT",
///   "message": "Validation failed: Insufficient payment: $10.00 tendered, $12.50 due"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&TerminalError> for ErrorResponse {
    fn from(err: &TerminalError) -> Self {
        let message = match err {
            TerminalError::Storage(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Storage failure: {}", e);
                "Could not save the transaction. Please retry.".to_string()
            }
            other => other.to_string(),
        };

        ErrorResponse {
            code: err.code(),
            message,
        }
    }
}

// =============================================================================
// Config Error
// =============================================================================

/// Errors loading or saving `terminal.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to write config: {0}")]
    Serialize(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Serialize(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::ValidationIssue;

    fn failed_with(code: IssueCode) -> TerminalError {
        TerminalError::ValidationFailed(ValidationReport {
            is_valid: false,
            errors: vec![ValidationIssue {
                code,
                field: None,
                message: "nope".to_string(),
            }],
            warnings: vec![],
            can_proceed: false,
        })
    }

    #[test]
    fn test_insufficient_payment_has_its_own_code() {
        assert_eq!(
            failed_with(IssueCode::InsufficientPayment).code(),
            ErrorCode::InsufficientPayment
        );
        assert_eq!(
            failed_with(IssueCode::EmptyCart).code(),
            ErrorCode::ValidationFailed
        );
    }

    #[test]
    fn test_core_transition_error_converts() {
        let err: TerminalError = CoreError::InvalidTransition {
            from: TransactionStep::Items,
            to: TransactionStep::Payment,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[test]
    fn test_receipt_exhaustion_converts() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let err: TerminalError = CoreError::ReceiptSequenceExhausted { date }.into();
        assert_eq!(err.code(), ErrorCode::ReceiptsExhausted);
        assert_eq!(err.to_string(), "Receipt numbers exhausted for 2026-01-31");
    }

    #[test]
    fn test_storage_message_is_generic() {
        let err = TerminalError::Storage(StoreError::Unavailable("disk full".to_string()));
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, ErrorCode::StorageError);
        assert!(!response.message.contains("disk full"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "STORAGE_ERROR");
    }
}
