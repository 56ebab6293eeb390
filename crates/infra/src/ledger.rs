//! Append-only stock movement records.
//!
//! Two distinct records are kept per the accounting rules:
//! - `StockLedgerEntry` tracks **owned-stock** movements only. Borrowed-pool
//!   credits on return are not ledgered as owned movement.
//! - `InventoryTransaction` tracks the **full** moved quantity of an
//!   operation regardless of which supply funded it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use canopy_core::{BookingId, ProductId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Dispatch,
    Return,
}

/// Owned-stock movement (signed delta; negative for dispatch debits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub id: Uuid,
    pub product_id: ProductId,
    pub booking_id: Option<BookingId>,
    pub delta: i64,
    pub reason: MovementKind,
    pub at: DateTime<Utc>,
}

impl StockLedgerEntry {
    pub fn new(
        product_id: ProductId,
        booking_id: Option<BookingId>,
        delta: i64,
        reason: MovementKind,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id,
            booking_id,
            delta,
            reason,
            at,
        }
    }
}

/// Full-quantity movement record for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: ProductId,
    pub booking_id: Option<BookingId>,
    pub kind: MovementKind,
    pub qty: i64,
    pub at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub fn new(
        product_id: ProductId,
        booking_id: Option<BookingId>,
        kind: MovementKind,
        qty: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            product_id,
            booking_id,
            kind,
            qty,
            at,
        }
    }
}
