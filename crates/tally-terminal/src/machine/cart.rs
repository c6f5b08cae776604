//! Cart mutations: items in, quantities changed, items out.
//!
//! Every mutation reprices the whole cart and records an items snapshot.

use chrono::Utc;
use tracing::{debug, info};

use tally_core::validation::{
    validate_customer_tier, validate_item_id, validate_line, validate_quantity,
};
use tally_core::{Line, StateUpdate, TransactionContext, TransactionStatus, TransactionStep};

use super::{items_snapshot, require_status, TransactionMachine};
use crate::error::{TerminalError, TerminalResult};

impl TransactionMachine {
    /// Merges `lines` into the cart by item id.
    pub async fn add_items(&self, id: &str, lines: Vec<Line>) -> TerminalResult<TransactionContext> {
        for line in &lines {
            validate_line(line)?;
        }

        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "add items")?;

        let added = lines.len();
        let mut ctx = checkpoint.context;
        ctx.merge_lines(lines);
        for line in &ctx.lines {
            validate_quantity(line.quantity)?;
        }

        let committed = self.commit_cart(id, ctx).await?;
        debug!(
            transaction_id = %id,
            added,
            line_count = committed.lines.len(),
            "Items added"
        );
        Ok(committed)
    }

    /// Sets a line's quantity; `quantity <= 0` removes the line.
    pub async fn update_item_quantity(
        &self,
        id: &str,
        item_id: &str,
        quantity: i64,
    ) -> TerminalResult<TransactionContext> {
        validate_item_id(item_id)?;
        validate_quantity(quantity)?;

        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "change quantities")?;

        let mut ctx = checkpoint.context;
        if !ctx.set_line_quantity(item_id, quantity) {
            return Err(TerminalError::LineNotFound {
                id: id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        debug!(transaction_id = %id, item_id, quantity, "Quantity updated");
        self.commit_cart(id, ctx).await
    }

    pub async fn remove_item(&self, id: &str, item_id: &str) -> TerminalResult<TransactionContext> {
        validate_item_id(item_id)?;

        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "remove items")?;

        let mut ctx = checkpoint.context;
        if !ctx.remove_line(item_id) {
            return Err(TerminalError::LineNotFound {
                id: id.to_string(),
                item_id: item_id.to_string(),
            });
        }

        debug!(transaction_id = %id, item_id, "Item removed");
        self.commit_cart(id, ctx).await
    }

    /// Records the customer's loyalty tier so tier-scoped rules can match.
    pub async fn assign_customer_tier(
        &self,
        id: &str,
        tier: &str,
    ) -> TerminalResult<TransactionContext> {
        let tier = validate_customer_tier(tier)?;

        let checkpoint = self.load(id).await?;
        require_status(&checkpoint, TransactionStatus::Active, "assign a customer")?;

        let mut ctx = checkpoint.context;
        info!(transaction_id = %id, tier = %tier, "Customer tier assigned");
        ctx.metadata.customer_tier = Some(tier);

        self.commit_cart(id, ctx).await
    }

    /// Reprices `ctx` and commits it with a fresh items snapshot.
    async fn commit_cart(
        &self,
        id: &str,
        mut ctx: TransactionContext,
    ) -> TerminalResult<TransactionContext> {
        let now = Utc::now();
        self.reprice(&mut ctx, now).await;

        let snapshot = items_snapshot(&ctx);
        let update = StateUpdate::at(now)
            .context(ctx)
            .snapshot(TransactionStep::Items, snapshot);

        Ok(self.commit(id, update).await?.context)
    }
}
