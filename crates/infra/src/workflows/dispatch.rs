use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use canopy_bookings::{Booking, DispatchLine, DispatchRecord};
use canopy_core::{ActorId, BookingId, DispatchId, ProductId};
use canopy_inventory::{self as inventory, BorrowedPool, StockError};

use crate::audit::{AuditAction, AuditEntry};
use crate::ledger::{InventoryTransaction, MovementKind, StockLedgerEntry};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::store::{StockStore, Versioned, WriteBatch};

use super::{FulfillmentError, cold_lead_gate, load_booking, reject_duplicate_products};

/// One requested product line for a dispatch or reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub qty: i64,
    /// Rental rate override; the catalog rate applies when absent.
    pub rate: Option<u64>,
}

/// A dispatch request: the lines to allocate, and whether to commit.
///
/// With `dry_run` set the allocator runs in projection mode: the booking
/// records a reservation draft and moves to `reserved`, but no stock level
/// changes and no ledger rows are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub lines: Vec<RequestedLine>,
    #[serde(default)]
    pub dry_run: bool,
}

impl DispatchRequest {
    fn validate(&self) -> Result<(), FulfillmentError> {
        if self.lines.is_empty() {
            return Err(FulfillmentError::InvalidQuantity(
                "at least one line is required".to_string(),
            ));
        }
        for line in &self.lines {
            if line.qty <= 0 {
                return Err(FulfillmentError::InvalidQuantity(format!(
                    "quantity for product {} must be positive, got {}",
                    line.product_id, line.qty
                )));
            }
        }
        reject_duplicate_products(self.lines.iter().map(|l| l.product_id))
    }
}

/// What a successful dispatch (or reservation) produced.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub booking: Booking,
    pub record: DispatchRecord,
    pub dry_run: bool,
}

/// Orchestrates allocation across owned stock and borrowed pools, ending in
/// one atomic commit of every touched document.
pub struct DispatchWorkflow {
    store: Arc<dyn StockStore>,
    retry: RetryPolicy,
}

impl DispatchWorkflow {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_policy(store: Arc<dyn StockStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Allocate and dispatch (or reserve, for dry runs) the requested lines.
    ///
    /// All-or-nothing across lines: any line failing allocation rejects the
    /// whole request with nothing persisted. Commit conflicts re-run the
    /// attempt from fresh reads under the retry policy.
    pub async fn dispatch(
        &self,
        booking_id: BookingId,
        request: DispatchRequest,
        actor: Option<ActorId>,
    ) -> Result<DispatchOutcome, FulfillmentError> {
        request.validate()?;
        run_with_retry(&self.retry, || self.attempt(booking_id, &request, actor)).await
    }

    async fn attempt(
        &self,
        booking_id: BookingId,
        request: &DispatchRequest,
        actor: Option<ActorId>,
    ) -> Result<DispatchOutcome, FulfillmentError> {
        let store = self.store.as_ref();
        let now = Utc::now();

        let mut booking = load_booking(store, booking_id).await?;
        if booking.doc.return_closed() {
            return Err(FulfillmentError::AlreadyReturned);
        }
        let (_client, guards) = cold_lead_gate(store, booking.doc.client_id()).await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        let mut products = Vec::new();
        let mut pools = Vec::new();
        let mut ledger = Vec::new();
        let mut transactions = Vec::new();

        for requested in &request.lines {
            let mut product = store.product(requested.product_id).await?.ok_or_else(|| {
                FulfillmentError::NotFound(format!("product {}", requested.product_id))
            })?;
            let candidates = store
                .pools_for_product(product.doc.id, &product.doc.name_key())
                .await?;
            let mut pool_docs: Vec<BorrowedPool> =
                candidates.iter().map(|v| v.doc.clone()).collect();

            let allocation = if request.dry_run {
                inventory::plan(&product.doc, &pool_docs, requested.qty)
            } else {
                inventory::commit(&mut product.doc, &mut pool_docs, requested.qty, now)
            }
            .map_err(|err| map_stock_error(err, &product.doc))?;

            let rate = requested.rate.unwrap_or(product.doc.rate);
            lines.push(DispatchLine::new(
                product.doc.id,
                product.doc.name.clone(),
                product.doc.unit.clone(),
                requested.qty,
                rate,
                allocation.projected_owned_qty,
                allocation.borrowed_usages.clone(),
            ));

            if !request.dry_run {
                if allocation.owned_used > 0 {
                    ledger.push(StockLedgerEntry::new(
                        product.doc.id,
                        Some(booking_id),
                        -allocation.owned_used,
                        MovementKind::Dispatch,
                        now,
                    ));
                }
                transactions.push(InventoryTransaction::new(
                    product.doc.id,
                    Some(booking_id),
                    MovementKind::Dispatch,
                    requested.qty,
                    now,
                ));
                for usage in &allocation.borrowed_usages {
                    let doc = pool_docs
                        .iter()
                        .find(|p| p.id == usage.pool_id)
                        .cloned()
                        .ok_or_else(|| {
                            FulfillmentError::InvalidState(format!(
                                "allocated pool {} missing from snapshot",
                                usage.pool_id
                            ))
                        })?;
                    let version = candidates
                        .iter()
                        .find(|v| v.doc.id == usage.pool_id)
                        .map(|v| v.version)
                        .ok_or_else(|| {
                            FulfillmentError::InvalidState(format!(
                                "allocated pool {} missing from snapshot",
                                usage.pool_id
                            ))
                        })?;
                    pools.push(Versioned::new(doc, version));
                }
                products.push(product);
            }
        }

        let record = DispatchRecord::new(DispatchId::new(), lines, now);
        let action = if request.dry_run {
            booking.doc.record_reservation(record.clone())?;
            AuditAction::Reserve
        } else {
            booking.doc.record_dispatch(record.clone())?;
            AuditAction::Dispatch
        };

        let meta = json!({
            "dryRun": request.dry_run,
            "total": record.total,
            "lines": record
                .lines
                .iter()
                .map(|l| json!({
                    "productId": l.product_id.to_string(),
                    "name": l.name,
                    "qty": l.qty,
                    "rate": l.rate,
                    "amount": l.amount,
                    "ownedAfter": l.owned_after,
                    "borrowedQty": l.borrowed_usages.iter().map(|u| u.quantity).sum::<i64>(),
                }))
                .collect::<Vec<_>>(),
        });
        let audit = AuditEntry::new(
            action,
            "booking",
            booking_id.to_string(),
            actor,
            meta,
            now,
        );

        let updated = booking.doc.clone();
        store
            .commit(WriteBatch {
                products,
                pools,
                bookings: vec![booking],
                guards,
                audit: vec![audit],
                ledger,
                transactions,
            })
            .await?;

        Ok(DispatchOutcome {
            booking: updated,
            record,
            dry_run: request.dry_run,
        })
    }
}

fn map_stock_error(err: StockError, product: &canopy_inventory::Product) -> FulfillmentError {
    match err {
        StockError::Insufficient { requested, .. } => {
            let shortage = err.shortage().unwrap_or(requested);
            FulfillmentError::Insufficient {
                product_id: product.id,
                product_name: product.name.clone(),
                requested,
                shortage,
            }
        }
        StockError::InvalidQuantity(q) => FulfillmentError::InvalidQuantity(format!(
            "quantity for product {} must be positive, got {q}",
            product.id
        )),
    }
}
