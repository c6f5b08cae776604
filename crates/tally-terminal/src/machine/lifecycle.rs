//! Start, suspend, resume, cancel, crash recovery and idle expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tally_core::{
    StateUpdate, TransactionCheckpoint, TransactionState, TransactionStatus, ValidationError,
    EXPIRED_REASON,
};

use super::{require_status, TransactionMachine};
use crate::error::{TerminalError, TerminalResult};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub cancelled: Vec<String>,
    /// Ids whose cancellation could not be written; retried next sweep.
    pub failed: Vec<String>,
}

impl TransactionMachine {
    /// Opens a new transaction at step `items`.
    pub async fn start(
        &self,
        user_id: &str,
        branch_id: &str,
        device_id: &str,
    ) -> TerminalResult<String> {
        require_non_empty("user_id", user_id)?;
        require_non_empty("branch_id", branch_id)?;
        require_non_empty("device_id", device_id)?;

        let id = Uuid::new_v4().to_string();
        let checkpoint = TransactionCheckpoint::start(&id, user_id, branch_id, device_id, Utc::now());

        self.store.create_state(&checkpoint).await?;
        self.index.insert(checkpoint).await;

        info!(transaction_id = %id, user_id, branch_id, device_id, "Transaction started");
        Ok(id)
    }

    /// Parks an active transaction. It leaves memory; the store keeps it.
    pub async fn suspend_transaction(&self, id: &str) -> TerminalResult<TransactionState> {
        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "suspend")?;

        let update = StateUpdate::at(Utc::now()).status(TransactionStatus::Suspended);
        let committed = self.commit(id, update).await?;

        info!(transaction_id = %id, "Transaction suspended");
        Ok(committed.state)
    }

    /// Brings a suspended transaction back with its lines and payment.
    pub async fn resume_transaction(&self, id: &str) -> TerminalResult<TransactionState> {
        let checkpoint = self
            .store
            .get_state(id)
            .await?
            .ok_or_else(|| TerminalError::NotFound(id.to_string()))?;
        require_status(&checkpoint, TransactionStatus::Suspended, "resume")?;

        let update = StateUpdate::at(Utc::now()).status(TransactionStatus::Active);
        let committed = self.commit(id, update).await?;

        info!(
            transaction_id = %id,
            line_count = committed.context.lines.len(),
            "Transaction resumed"
        );
        Ok(committed.state)
    }

    /// Marks a transaction cancelled from any status.
    ///
    /// Cancelling twice is a no-op. Cancelling a completed transaction only
    /// changes its state record; the finalized sale and its queue entry stay
    /// as written.
    pub async fn cancel_transaction(
        &self,
        id: &str,
        reason: &str,
    ) -> TerminalResult<TransactionState> {
        let checkpoint = self.load(id).await?;
        let previous = checkpoint.status();

        if previous == TransactionStatus::Cancelled {
            self.index.remove(id).await;
            return Ok(checkpoint.state);
        }

        let update = StateUpdate::at(Utc::now())
            .status(TransactionStatus::Cancelled)
            .cancel_reason(reason);
        let committed = self.commit(id, update).await?;

        if previous == TransactionStatus::Completed {
            warn!(transaction_id = %id, reason, "Completed transaction cancelled");
        } else {
            info!(transaction_id = %id, reason, "Transaction cancelled");
        }
        Ok(committed.state)
    }

    /// Reloads a transaction after a restart.
    ///
    /// ## Returns
    /// - `None` if it sat idle past the expiry window (it is now cancelled)
    /// - the state otherwise; only active transactions go back into memory
    pub async fn recover_transaction(&self, id: &str) -> TerminalResult<Option<TransactionState>> {
        let checkpoint = self
            .store
            .get_state(id)
            .await?
            .ok_or_else(|| TerminalError::NotFound(id.to_string()))?;

        if checkpoint.status().is_terminal() {
            debug!(transaction_id = %id, status = %checkpoint.status(), "Nothing to recover");
            return Ok(Some(checkpoint.state));
        }

        let now = Utc::now();
        if checkpoint.state.is_idle_beyond(now, self.settings.idle_expiry) {
            self.expire(&checkpoint, now).await?;
            return Ok(None);
        }

        if checkpoint.status() == TransactionStatus::Active {
            self.index.insert(checkpoint.clone()).await;
        }

        info!(
            transaction_id = %id,
            status = %checkpoint.status(),
            step = %checkpoint.state.current_step,
            "Transaction recovered"
        );
        Ok(Some(checkpoint.state))
    }

    /// Cancels every stored active transaction idle past the expiry window.
    ///
    /// One failed write does not stop the sweep.
    pub async fn cleanup_expired_transactions(&self) -> TerminalResult<SweepSummary> {
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(self.settings.idle_expiry)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = self.store.query_active_states_older_than(cutoff).await?;

        let mut summary = SweepSummary::default();
        for checkpoint in stale {
            let id = checkpoint.id().to_string();
            match self.expire(&checkpoint, now).await {
                Ok(_) => summary.cancelled.push(id),
                Err(e) => {
                    error!(transaction_id = %id, error = %e, "Failed to expire transaction");
                    summary.failed.push(id);
                }
            }
        }

        if !summary.cancelled.is_empty() || !summary.failed.is_empty() {
            info!(
                cancelled = summary.cancelled.len(),
                failed = summary.failed.len(),
                "Expiry sweep finished"
            );
        }
        Ok(summary)
    }

    /// Runs [`Self::cleanup_expired_transactions`] every `period` until
    /// `shutdown` receives or closes.
    pub async fn run_expiry_sweep_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        info!(interval_secs = period.as_secs(), "Starting expiry sweep");

        // tokio panics on a zero period
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_expired_transactions().await {
                        error!(?e, "Expiry sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Expiry sweep shutting down");
                    break;
                }
            }
        }
    }

    async fn expire(
        &self,
        checkpoint: &TransactionCheckpoint,
        now: DateTime<Utc>,
    ) -> TerminalResult<TransactionCheckpoint> {
        let idle_hours = now
            .signed_duration_since(checkpoint.state.last_updated)
            .num_hours();
        warn!(
            transaction_id = %checkpoint.id(),
            idle_hours,
            "Cancelling idle transaction"
        );

        let update = StateUpdate::at(now)
            .status(TransactionStatus::Cancelled)
            .cancel_reason(EXPIRED_REASON);
        self.commit(checkpoint.id(), update).await
    }
}

fn require_non_empty(field: &str, value: &str) -> TerminalResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        }
        .into());
    }
    Ok(())
}
