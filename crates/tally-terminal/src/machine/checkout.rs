//! Step moves, payment, validation and completion.
//!
//! ## Completion
//! ```text
//! complete_transaction(id)
//!    │
//!    ├─ status must be active
//!    ├─ totals = Σ line totals + tax
//!    ├─ validate items + pricing + payment + confirmation
//!    │     └─ any error ──► persist messages, return ValidationFailed
//!    ├─ receipt RCP-YYYYMMDD-######
//!    ▼
//! DurableStore::complete_state   ← sale + queue entry + status, one commit
//!    │
//!    ▼
//! evict from index, return FinalizedSale
//! ```

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tally_core::steps::ensure_transition;
use tally_core::totals::compute;
use tally_core::validation::{validate_for_completion, validate_payment_breakdown, validate_step};
use tally_core::{
    FinalizedSale, PaymentBreakdown, SaleTotals, StateUpdate, TransactionState,
    TransactionStatus, TransactionStep, ValidationReport,
};

use super::{require_status, TransactionMachine};
use crate::error::{TerminalError, TerminalResult};

impl TransactionMachine {
    /// Moves to an adjacent step.
    ///
    /// Entering `pricing` reprices the cart so the pricing validator sees
    /// current rules.
    pub async fn transition(
        &self,
        id: &str,
        to: TransactionStep,
    ) -> TerminalResult<TransactionState> {
        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "change step")?;

        let from = checkpoint.state.current_step;
        ensure_transition(from, to)?;

        let now = Utc::now();
        let mut update = StateUpdate::at(now).step(to);

        if to == TransactionStep::Pricing {
            let mut ctx = checkpoint.context;
            self.reprice(&mut ctx, now).await;
            let totals = compute(&ctx.lines, self.settings.tax_rate);
            update = update
                .snapshot(TransactionStep::Pricing, totals_snapshot(&totals))
                .context(ctx);
        }

        let committed = self.commit(id, update).await?;
        debug!(transaction_id = %id, %from, %to, "Step changed");
        Ok(committed.state)
    }

    /// Stores the tender and moves to the payment step.
    pub async fn set_payment(
        &self,
        id: &str,
        payment: PaymentBreakdown,
    ) -> TerminalResult<TransactionState> {
        validate_payment_breakdown(&payment)?;

        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "take payment")?;

        let mut ctx = checkpoint.context;
        ctx.payment = Some(payment);

        let snapshot = json!({ "tendered_cents": payment.total().cents() });
        let update = StateUpdate::at(Utc::now())
            .step(TransactionStep::Payment)
            .context(ctx)
            .snapshot(TransactionStep::Payment, snapshot);

        let committed = self.commit(id, update).await?;
        debug!(
            transaction_id = %id,
            tendered_cents = payment.total().cents(),
            "Payment recorded"
        );
        Ok(committed.state)
    }

    /// Runs the validator for the current step.
    pub async fn validate_transaction(&self, id: &str) -> TerminalResult<ValidationReport> {
        let checkpoint = self.load(id).await?;
        let totals = compute(&checkpoint.context.lines, self.settings.tax_rate);

        Ok(validate_step(
            checkpoint.state.current_step,
            &checkpoint.context,
            &totals,
            &self.settings.limits,
        ))
    }

    /// Subtotal, discount, tax and grand total of the current cart.
    pub async fn sale_totals(&self, id: &str) -> TerminalResult<SaleTotals> {
        let checkpoint = self.load(id).await?;
        Ok(compute(&checkpoint.context.lines, self.settings.tax_rate))
    }

    /// Seeds the receipt sequence from today's latest stored sale so a
    /// restarted terminal never reissues a number.
    pub async fn restore_receipt_sequence(&self) -> TerminalResult<Option<String>> {
        let today = Utc::now().date_naive();
        let latest = self.store.latest_receipt_number(today).await?;

        match &latest {
            Some(receipt_number) => {
                self.receipts.observe(receipt_number);
                info!(receipt_number = %receipt_number, "Receipt sequence restored");
            }
            None => debug!(date = %today, "No receipts issued today"),
        }
        Ok(latest)
    }

    /// Finalizes the sale.
    ///
    /// Nothing is written unless every completion check passes, except the
    /// failing messages, which are recorded on the state.
    pub async fn complete_transaction(&self, id: &str) -> TerminalResult<FinalizedSale> {
        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "complete")?;

        let ctx = &checkpoint.context;
        let totals = compute(&ctx.lines, self.settings.tax_rate);
        let report = validate_for_completion(ctx, &totals, &self.settings.limits);

        if !report.can_proceed {
            warn!(
                transaction_id = %id,
                errors = ?report.error_messages(),
                "Completion blocked by validation"
            );
            let update = StateUpdate::at(Utc::now()).validation_errors(report.error_messages());
            self.commit(id, update).await?;
            return Err(TerminalError::ValidationFailed(report));
        }

        for warning in &report.warnings {
            warn!(transaction_id = %id, code = ?warning.code, "{}", warning.message);
        }

        let now = Utc::now();
        let payment = ctx.payment.unwrap_or_default();
        let receipt_number = self.receipts.next(now)?;

        let sale = FinalizedSale {
            id: Uuid::new_v4().to_string(),
            transaction_id: id.to_string(),
            receipt_number: receipt_number.clone(),
            lines: ctx.lines.clone(),
            payment,
            subtotal_cents: totals.subtotal_cents,
            discount_cents: totals.discount_cents,
            tax_cents: totals.tax_cents,
            total_amount_cents: totals.grand_total_cents,
            change_cents: (payment.total() - totals.grand_total()).cents(),
            user_id: ctx.metadata.user_id.clone(),
            branch_id: ctx.metadata.branch_id.clone(),
            device_id: ctx.metadata.device_id.clone(),
            started_at: ctx.metadata.started_at,
            completed_at: now,
        };

        let update = StateUpdate::at(now)
            .status(TransactionStatus::Completed)
            .step(TransactionStep::Printing)
            .validation_errors(Vec::new())
            .completed_at(now)
            .snapshot(
                TransactionStep::Confirmation,
                json!({
                    "receipt_number": receipt_number,
                    "total_amount_cents": totals.grand_total_cents,
                }),
            );

        self.store
            .complete_state(id, &update, &sale)
            .await
            .map_err(|e| {
                warn!(transaction_id = %id, error = %e, "Completion write failed");
                TerminalError::from(e)
            })?;
        self.index.remove(id).await;

        info!(
            transaction_id = %id,
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_amount_cents,
            change_cents = sale.change_cents,
            "Transaction completed"
        );
        Ok(sale)
    }
}

fn totals_snapshot(totals: &SaleTotals) -> serde_json::Value {
    json!({
        "subtotal_cents": totals.subtotal_cents,
        "discount_cents": totals.discount_cents,
        "tax_cents": totals.tax_cents,
        "grand_total_cents": totals.grand_total_cents,
    })
}
