use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use canopy_bookings::{
    Booking, ReturnLine, ReturnRecord, ReturnSummary, ReturnSummaryTotals, ReturnTotals,
};
use canopy_core::{ActorId, BookingId, ClientId, PoolId, ProductId};

use crate::audit::{AuditAction, AuditEntry};
use crate::ledger::{InventoryTransaction, MovementKind, StockLedgerEntry};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::store::{StockStore, Versioned, WriteBatch};

use super::{FulfillmentError, cold_lead_gate, load_booking, reject_duplicate_products};

/// One line of a return submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLineRequest {
    pub product_id: ProductId,
    /// Quantity the caller expected back in this batch; drives the default
    /// shortage computation.
    pub expected: i64,
    /// Physical units actually returned.
    pub returned: i64,
    /// Explicit shortage override; `max(0, expected - returned)` when absent.
    pub shortage: Option<i64>,
    #[serde(default)]
    pub damage: u64,
    #[serde(default)]
    pub late_fee: u64,
    /// Per-unit loss price override; falls back to the product's buy price,
    /// then the line's rental rate.
    pub loss_price: Option<u64>,
}

/// A return submission for a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub lines: Vec<ReturnLineRequest>,
    /// Caller-supplied dues override; the sum of line adjustments when absent.
    pub return_due: Option<u64>,
}

impl ReturnRequest {
    fn validate(&self) -> Result<(), FulfillmentError> {
        if self.lines.is_empty() {
            return Err(FulfillmentError::InvalidQuantity(
                "at least one line is required".to_string(),
            ));
        }
        for line in &self.lines {
            if line.returned <= 0 {
                return Err(FulfillmentError::InvalidQuantity(format!(
                    "returned quantity for product {} must be positive, got {}",
                    line.product_id, line.returned
                )));
            }
            if line.shortage.is_some_and(|s| s < 0) {
                return Err(FulfillmentError::InvalidQuantity(format!(
                    "shortage for product {} cannot be negative",
                    line.product_id
                )));
            }
        }
        reject_duplicate_products(self.lines.iter().map(|l| l.product_id))
    }
}

/// Processed detail of one returned line.
#[derive(Debug, Clone)]
pub struct ReturnLineOutcome {
    pub line: ReturnLine,
    pub completed: bool,
}

/// What a successful return batch produced.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub booking: Booking,
    pub lines: Vec<ReturnLineOutcome>,
    pub totals: ReturnTotals,
    pub all_completed: bool,
    pub return_due: u64,
    pub client_id: ClientId,
}

/// Processes returned quantities against the booking's active dispatch:
/// repays borrowed-pool debts before crediting owned stock, computes the
/// shortage/damage/late charges, and closes the booking once every line
/// is complete.
pub struct ReturnWorkflow {
    store: Arc<dyn StockStore>,
    retry: RetryPolicy,
}

impl ReturnWorkflow {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(store: Arc<dyn StockStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Process a return batch atomically.
    ///
    /// Any line failing its idempotency or quantity checks rejects the whole
    /// batch with nothing persisted. Commit conflicts re-run the attempt from
    /// fresh reads under the retry policy.
    pub async fn process(
        &self,
        booking_id: BookingId,
        request: ReturnRequest,
        actor: Option<ActorId>,
    ) -> Result<ReturnOutcome, FulfillmentError> {
        request.validate()?;
        run_with_retry(&self.retry, || self.attempt(booking_id, &request, actor)).await
    }

    async fn attempt(
        &self,
        booking_id: BookingId,
        request: &ReturnRequest,
        actor: Option<ActorId>,
    ) -> Result<ReturnOutcome, FulfillmentError> {
        let store = self.store.as_ref();
        let now = Utc::now();

        let mut booking = load_booking(store, booking_id).await?;
        if booking.doc.return_closed() {
            return Err(FulfillmentError::AlreadyReturned);
        }
        let (client, guards) = cold_lead_gate(store, booking.doc.client_id()).await?;

        let mut products: HashMap<ProductId, Versioned<canopy_inventory::Product>> =
            HashMap::new();
        let mut pools: HashMap<PoolId, Versioned<canopy_inventory::BorrowedPool>> = HashMap::new();
        let mut ledger = Vec::new();
        let mut transactions = Vec::new();
        let mut lines = Vec::with_capacity(request.lines.len());

        for input in &request.lines {
            let applied = booking
                .doc
                .apply_line_return(input.product_id, input.returned, now)?;
            let settlement = booking.doc.settle_borrowed(input.product_id, input.returned)?;

            // Repay pool debts in their original drain order. A pool deleted
            // since dispatch cannot absorb its credit; route it to owned
            // stock so no returned unit vanishes.
            let mut owned_credit = settlement.owned_credit;
            for credit in settlement.pool_credits {
                match pools.entry(credit.pool_id) {
                    std::collections::hash_map::Entry::Occupied(mut entry) => {
                        entry
                            .get_mut()
                            .doc
                            .repay(credit.quantity)
                            .map_err(|e| FulfillmentError::InvalidState(e.to_string()))?;
                    }
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        match store.pool(credit.pool_id).await? {
                            Some(mut pool) => {
                                pool.doc
                                    .repay(credit.quantity)
                                    .map_err(|e| FulfillmentError::InvalidState(e.to_string()))?;
                                entry.insert(pool);
                            }
                            None => {
                                warn!(
                                    pool_id = %credit.pool_id,
                                    quantity = credit.quantity,
                                    "borrowed pool missing at repayment, crediting owned stock"
                                );
                                owned_credit += credit.quantity;
                            }
                        }
                    }
                }
            }

            let product = match products.entry(input.product_id) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let loaded = store.product(input.product_id).await?.ok_or_else(|| {
                        FulfillmentError::NotFound(format!("product {}", input.product_id))
                    })?;
                    entry.insert(loaded)
                }
            };
            if owned_credit > 0 {
                product
                    .doc
                    .credit_owned(owned_credit)
                    .map_err(|e| FulfillmentError::InvalidState(e.to_string()))?;
                ledger.push(StockLedgerEntry::new(
                    input.product_id,
                    Some(booking_id),
                    owned_credit,
                    MovementKind::Return,
                    now,
                ));
            }
            transactions.push(InventoryTransaction::new(
                input.product_id,
                Some(booking_id),
                MovementKind::Return,
                input.returned,
                now,
            ));

            let shortage = input
                .shortage
                .unwrap_or((input.expected - input.returned).max(0))
                .max(0);
            let loss_price = input
                .loss_price
                .or(product.doc.buy_price)
                .unwrap_or(applied.rate);
            let shortage_cost = (shortage as u64) * loss_price;
            let line_adjust = shortage_cost + input.damage + input.late_fee;

            lines.push(ReturnLineOutcome {
                line: ReturnLine {
                    product_id: input.product_id,
                    dispatched_qty: applied.dispatched_qty,
                    returned_qty: input.returned,
                    shortage,
                    damage: input.damage,
                    late_fee: input.late_fee,
                    loss_price,
                    shortage_cost,
                    line_adjust,
                },
                completed: applied.completed,
            });
        }

        let record = ReturnRecord::new(lines.iter().map(|l| l.line.clone()).collect(), now);
        let totals = record.totals;
        booking.doc.record_return(record)?;
        let all_completed = booking.doc.close_if_complete();

        let computed_due: u64 = lines.iter().map(|l| l.line.line_adjust).sum();
        let return_due = match request.return_due {
            Some(due) => {
                if due != computed_due {
                    warn!(
                        booking_id = %booking_id,
                        supplied = due,
                        computed = computed_due,
                        "return dues override differs from computed sum"
                    );
                }
                due
            }
            None => computed_due,
        };
        booking.doc.set_return_summary(ReturnSummary {
            totals: ReturnSummaryTotals {
                shortage: totals.shortage_cost,
                damage: totals.damage,
                late: totals.late,
                return_due,
            },
            at: now,
        });

        let meta = json!({
            "returnDue": return_due,
            "computedDue": computed_due,
            "allCompleted": all_completed,
            "totals": {
                "shortageCost": totals.shortage_cost,
                "damage": totals.damage,
                "late": totals.late,
            },
            "lines": lines
                .iter()
                .map(|l| json!({
                    "productId": l.line.product_id.to_string(),
                    "returnedQty": l.line.returned_qty,
                    "shortage": l.line.shortage,
                    "lineAdjust": l.line.line_adjust,
                    "completed": l.completed,
                }))
                .collect::<Vec<_>>(),
        });
        let audit = AuditEntry::new(
            AuditAction::Return,
            "booking",
            booking_id.to_string(),
            actor,
            meta,
            now,
        );

        let updated = booking.doc.clone();
        let client_id = client.doc.id;
        store
            .commit(WriteBatch {
                products: products.into_values().collect(),
                pools: pools.into_values().collect(),
                bookings: vec![booking],
                guards,
                audit: vec![audit],
                ledger,
                transactions,
            })
            .await?;

        Ok(ReturnOutcome {
            booking: updated,
            lines,
            totals,
            all_completed,
            return_due,
            client_id,
        })
    }
}
