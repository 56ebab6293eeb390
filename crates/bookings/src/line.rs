use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canopy_core::{DispatchId, ProductId};
use canopy_inventory::BorrowedUsage;

/// One product line inside a selection, draft, or committed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchLine {
    pub product_id: ProductId,
    /// Name/unit snapshot at allocation time; later catalog edits don't rewrite history.
    pub name: String,
    pub unit: String,
    pub qty: i64,
    /// Rental rate in smallest currency unit.
    pub rate: u64,
    pub amount: u64,
    /// Owned stock level right after this line's allocation.
    pub owned_after: i64,
    /// Cumulative quantity returned so far; monotone, never exceeds `qty`.
    pub returned_qty: i64,
    pub completed: bool,
    /// Set the first time the line completes, never overwritten.
    pub completed_at: Option<DateTime<Utc>>,
    /// Which pools funded this line, in drain order; `quantity` is the
    /// outstanding debt still owed to each pool.
    pub borrowed_usages: Vec<BorrowedUsage>,
}

impl DispatchLine {
    pub fn new(
        product_id: ProductId,
        name: impl Into<String>,
        unit: impl Into<String>,
        qty: i64,
        rate: u64,
        owned_after: i64,
        borrowed_usages: Vec<BorrowedUsage>,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            unit: unit.into(),
            qty,
            rate,
            amount: (qty.max(0) as u64) * rate,
            owned_after,
            returned_qty: 0,
            completed: false,
            completed_at: None,
            borrowed_usages,
        }
    }

    /// Quantity still out with the client.
    pub fn remaining(&self) -> i64 {
        self.qty - self.returned_qty
    }
}

/// Snapshot of one allocator run across a set of lines.
///
/// Appended to `dispatch_drafts` for reservations and to `dispatches` for
/// committed dispatches; committed records are referenced by id from the
/// booking's `active_dispatch` pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: DispatchId,
    pub lines: Vec<DispatchLine>,
    pub total: u64,
    pub at: DateTime<Utc>,
}

impl DispatchRecord {
    pub fn new(id: DispatchId, lines: Vec<DispatchLine>, at: DateTime<Utc>) -> Self {
        let total = lines.iter().map(|l| l.amount).sum();
        Self {
            id,
            lines,
            total,
            at,
        }
    }
}

/// One processed line of a return batch, with its charge breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub product_id: ProductId,
    pub dispatched_qty: i64,
    pub returned_qty: i64,
    pub shortage: i64,
    pub damage: u64,
    pub late_fee: u64,
    /// Price applied to each missing unit.
    pub loss_price: u64,
    pub shortage_cost: u64,
    /// shortage_cost + damage + late_fee: this line's contribution to the dues.
    pub line_adjust: u64,
}

/// Aggregated charges of a single return batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnTotals {
    pub shortage_cost: u64,
    pub damage: u64,
    pub late: u64,
}

/// Snapshot of a processed return batch (append-only history entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub lines: Vec<ReturnLine>,
    pub totals: ReturnTotals,
    pub at: DateTime<Utc>,
}

impl ReturnRecord {
    pub fn new(lines: Vec<ReturnLine>, at: DateTime<Utc>) -> Self {
        let totals = ReturnTotals {
            shortage_cost: lines.iter().map(|l| l.shortage_cost).sum(),
            damage: lines.iter().map(|l| l.damage).sum(),
            late: lines.iter().map(|l| l.late_fee).sum(),
        };
        Self { lines, totals, at }
    }
}

/// Totals of the most recent return, cached on the booking for invoicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSummaryTotals {
    pub shortage: u64,
    pub damage: u64,
    pub late: u64,
    pub return_due: u64,
}

/// The "return dues" figure the invoicing side reads to prefill charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub totals: ReturnSummaryTotals,
    pub at: DateTime<Utc>,
}
