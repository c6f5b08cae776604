//! Step validators.
//!
//! | Step         | Error                                          | Warning                      |
//! |--------------|------------------------------------------------|------------------------------|
//! | items        | no lines; any quantity <= 0                    | more than `max_lines_warning` lines |
//! | pricing      | a line total disagrees with qty × unit − discount | -                         |
//! | payment      | tendered < grand total                         | tendered > factor × total    |
//! | confirmation | grand total <= 0                               | -                            |
//! | printing     | -                                              | -                            |

use serde::{Deserialize, Serialize};

use crate::steps::TransactionStep;
use crate::totals::SaleTotals;
use crate::transaction::TransactionContext;

pub const EMPTY_CART_MESSAGE: &str = "No items in transaction";

/// Machine-readable reason for a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    EmptyCart,
    NonPositiveQuantity,
    TooManyLines,
    LineTotalMismatch,
    InsufficientPayment,
    Overpayment,
    NonPositiveTotal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: IssueCode,
    /// Field or line the issue points at, for field-level rendering.
    pub field: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: IssueCode, field: Option<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            code,
            field,
            message: message.into(),
        }
    }
}

/// Outcome of a step validation.
///
/// `can_proceed` is false iff there is at least one error. `is_valid` is
/// stricter: it also requires no warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub can_proceed: bool,
}

impl ValidationReport {
    fn from_issues(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        ValidationReport {
            is_valid: errors.is_empty() && warnings.is_empty(),
            can_proceed: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// A report with nothing to say.
    pub fn pass() -> Self {
        Self::from_issues(Vec::new(), Vec::new())
    }

    pub fn merge(self, other: ValidationReport) -> Self {
        let mut errors = self.errors;
        errors.extend(other.errors);
        let mut warnings = self.warnings;
        warnings.extend(other.warnings);
        Self::from_issues(errors, warnings)
    }

    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}

/// Thresholds for the warning-level checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLimits {
    pub max_lines_warning: usize,
    pub overpayment_factor: i64,
}

impl Default for StepLimits {
    fn default() -> Self {
        StepLimits {
            max_lines_warning: 100,
            overpayment_factor: 2,
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Runs the validator registered for `step`.
pub fn validate_step(
    step: TransactionStep,
    ctx: &TransactionContext,
    totals: &SaleTotals,
    limits: &StepLimits,
) -> ValidationReport {
    match step {
        TransactionStep::Items => validate_items(ctx, limits),
        TransactionStep::Pricing => validate_pricing(ctx),
        TransactionStep::Payment => validate_payment(ctx, totals, limits),
        TransactionStep::Confirmation => validate_confirmation(totals),
        TransactionStep::Printing => ValidationReport::pass(),
    }
}

/// Everything that must hold before a sale is finalized.
pub fn validate_for_completion(
    ctx: &TransactionContext,
    totals: &SaleTotals,
    limits: &StepLimits,
) -> ValidationReport {
    [
        TransactionStep::Items,
        TransactionStep::Pricing,
        TransactionStep::Payment,
        TransactionStep::Confirmation,
    ]
    .into_iter()
    .map(|step| validate_step(step, ctx, totals, limits))
    .fold(ValidationReport::pass(), ValidationReport::merge)
}

// =============================================================================
// Validators
// =============================================================================

fn validate_items(ctx: &TransactionContext, limits: &StepLimits) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if ctx.lines.is_empty() {
        errors.push(ValidationIssue::new(
            IssueCode::EmptyCart,
            None,
            EMPTY_CART_MESSAGE,
        ));
    }

    for line in ctx.lines.iter().filter(|l| l.quantity <= 0) {
        errors.push(ValidationIssue::new(
            IssueCode::NonPositiveQuantity,
            Some(line.item_id.clone()),
            format!("Invalid quantity {} for item {}", line.quantity, line.item_id),
        ));
    }

    if ctx.lines.len() > limits.max_lines_warning {
        warnings.push(ValidationIssue::new(
            IssueCode::TooManyLines,
            None,
            format!(
                "Transaction has {} lines (more than {})",
                ctx.lines.len(),
                limits.max_lines_warning
            ),
        ));
    }

    ValidationReport::from_issues(errors, warnings)
}

fn validate_pricing(ctx: &TransactionContext) -> ValidationReport {
    let errors = ctx
        .lines
        .iter()
        .filter(|l| l.total_price() != l.expected_total())
        .map(|l| {
            ValidationIssue::new(
                IssueCode::LineTotalMismatch,
                Some(l.item_id.clone()),
                format!(
                    "Line total {} for item {} does not match expected {}",
                    l.total_price(),
                    l.item_id,
                    l.expected_total()
                ),
            )
        })
        .collect();

    ValidationReport::from_issues(errors, Vec::new())
}

fn validate_payment(
    ctx: &TransactionContext,
    totals: &SaleTotals,
    limits: &StepLimits,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let tendered = ctx.payment.map(|p| p.total()).unwrap_or_default();
    let due = totals.grand_total();

    if tendered < due {
        errors.push(ValidationIssue::new(
            IssueCode::InsufficientPayment,
            Some("payment".to_string()),
            format!("Insufficient payment: {tendered} tendered, {due} due"),
        ));
    } else if due.is_positive() && tendered > due * limits.overpayment_factor {
        warnings.push(ValidationIssue::new(
            IssueCode::Overpayment,
            Some("payment".to_string()),
            format!("Payment {tendered} is more than {}x the total {due}", limits.overpayment_factor),
        ));
    }

    ValidationReport::from_issues(errors, warnings)
}

fn validate_confirmation(totals: &SaleTotals) -> ValidationReport {
    let mut errors = Vec::new();

    if !totals.grand_total().is_positive() {
        errors.push(ValidationIssue::new(
            IssueCode::NonPositiveTotal,
            None,
            "Transaction total must be greater than zero",
        ));
    }

    ValidationReport::from_issues(errors, Vec::new())
}

// =============================================================================
// Unit Tests
// =============================================================================
