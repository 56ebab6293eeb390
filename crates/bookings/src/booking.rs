use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use canopy_core::{BookingId, ClientId, DispatchId, Entity, PoolId, ProductId};

use crate::line::{DispatchLine, DispatchRecord, ReturnRecord, ReturnSummary};

/// Booking fulfillment lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    New,
    Confirmed,
    Reserved,
    Dispatched,
    Returned,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::New => "new",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Reserved => "reserved",
            BookingStatus::Dispatched => "dispatched",
            BookingStatus::Returned => "returned",
        }
    }
}

/// Deterministic booking-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The booking's returns are closed; no further dispatch or return is accepted.
    #[error("booking is fully returned and closed")]
    Closed,

    #[error("cannot {action} a booking in status '{}'", .from.as_str())]
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
    },

    #[error("no dispatched line for product {0}")]
    LineNotFound(ProductId),

    /// Idempotency guard: the line has nothing left to return.
    #[error("line for product {0} is already fully returned")]
    LineAlreadyReturned(ProductId),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
}

/// Result of applying a returned quantity to a dispatch line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedReturn {
    pub dispatched_qty: i64,
    pub rate: u64,
    pub completed: bool,
}

/// Credit owed back to a single borrowed pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCredit {
    pub pool_id: PoolId,
    pub quantity: i64,
}

/// How a returned quantity is routed: pool debts first, owned stock last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowedSettlement {
    /// Credits in the order the pools were originally drained.
    pub pool_credits: Vec<PoolCredit>,
    /// Remainder routed to owned stock after all recorded debts are settled.
    pub owned_credit: i64,
}

/// Aggregate root: an event booking and its fulfillment history.
///
/// `dispatches` and `returns` are append-only. The committed dispatch that
/// returns settle against is referenced explicitly via `active_dispatch`
/// rather than by array position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    client_id: ClientId,
    status: BookingStatus,
    selections: Vec<DispatchLine>,
    dispatch_drafts: Vec<DispatchRecord>,
    dispatches: Vec<DispatchRecord>,
    active_dispatch: Option<DispatchId>,
    returns: Vec<ReturnRecord>,
    return_closed: bool,
    last_return_summary: Option<ReturnSummary>,
    created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: BookingId, client_id: ClientId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            client_id,
            status: BookingStatus::New,
            selections: Vec::new(),
            dispatch_drafts: Vec::new(),
            dispatches: Vec::new(),
            active_dispatch: None,
            returns: Vec::new(),
            return_closed: false,
            last_return_summary: None,
            created_at,
        }
    }

    pub fn id_typed(&self) -> BookingId {
        self.id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn selections(&self) -> &[DispatchLine] {
        &self.selections
    }

    pub fn dispatch_drafts(&self) -> &[DispatchRecord] {
        &self.dispatch_drafts
    }

    pub fn dispatches(&self) -> &[DispatchRecord] {
        &self.dispatches
    }

    pub fn active_dispatch(&self) -> Option<DispatchId> {
        self.active_dispatch
    }

    pub fn returns(&self) -> &[ReturnRecord] {
        &self.returns
    }

    pub fn return_closed(&self) -> bool {
        self.return_closed
    }

    pub fn last_return_summary(&self) -> Option<&ReturnSummary> {
        self.last_return_summary.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn ensure_open(&self) -> Result<(), BookingError> {
        if self.return_closed {
            return Err(BookingError::Closed);
        }
        Ok(())
    }

    /// `new -> confirmed`.
    pub fn confirm(&mut self) -> Result<(), BookingError> {
        self.ensure_open()?;
        if self.status != BookingStatus::New {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                action: "confirm",
            });
        }
        self.status = BookingStatus::Confirmed;
        Ok(())
    }

    /// Append a planned (not yet dispatched) line.
    pub fn add_selection(&mut self, line: DispatchLine) -> Result<(), BookingError> {
        self.ensure_open()?;
        if matches!(self.status, BookingStatus::Dispatched | BookingStatus::Returned) {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                action: "plan lines for",
            });
        }
        self.selections.push(line);
        Ok(())
    }

    /// Append a non-committing reservation snapshot: `{new|confirmed|reserved} -> reserved`.
    pub fn record_reservation(&mut self, record: DispatchRecord) -> Result<(), BookingError> {
        self.ensure_open()?;
        match self.status {
            BookingStatus::New | BookingStatus::Confirmed | BookingStatus::Reserved => {
                self.dispatch_drafts.push(record);
                self.status = BookingStatus::Reserved;
                Ok(())
            }
            from => Err(BookingError::InvalidTransition {
                from,
                action: "reserve",
            }),
        }
    }

    /// Append a committed dispatch snapshot: `{new|confirmed|reserved} -> dispatched`.
    pub fn record_dispatch(&mut self, record: DispatchRecord) -> Result<(), BookingError> {
        self.ensure_open()?;
        match self.status {
            BookingStatus::New | BookingStatus::Confirmed | BookingStatus::Reserved => {
                self.active_dispatch = Some(record.id);
                self.dispatches.push(record);
                self.status = BookingStatus::Dispatched;
                Ok(())
            }
            from => Err(BookingError::InvalidTransition {
                from,
                action: "dispatch",
            }),
        }
    }

    /// The lines a return settles against: the active dispatch if one was
    /// committed, else the planned selections.
    pub fn target_lines(&self) -> &[DispatchLine] {
        match self.active_dispatch {
            Some(id) => self
                .dispatches
                .iter()
                .find(|d| d.id == id)
                .map(|d| d.lines.as_slice())
                .unwrap_or(&[]),
            None => &self.selections,
        }
    }

    fn target_line_mut(&mut self, product_id: ProductId) -> Option<&mut DispatchLine> {
        let lines = match self.active_dispatch {
            Some(id) => {
                let record = self.dispatches.iter_mut().find(|d| d.id == id)?;
                &mut record.lines
            }
            None => &mut self.selections,
        };
        lines.iter_mut().find(|l| l.product_id == product_id)
    }

    /// Apply a returned quantity to the matching line.
    ///
    /// Enforces the per-line idempotency guard (a completed line rejects any
    /// further return) and the quantity bound `0 < returned <= remaining`.
    /// `completed_at` is stamped the first time the line completes.
    pub fn apply_line_return(
        &mut self,
        product_id: ProductId,
        returned: i64,
        now: DateTime<Utc>,
    ) -> Result<AppliedReturn, BookingError> {
        self.ensure_open()?;
        let line = self
            .target_line_mut(product_id)
            .ok_or(BookingError::LineNotFound(product_id))?;

        let remaining = line.remaining();
        if line.completed || remaining <= 0 {
            return Err(BookingError::LineAlreadyReturned(product_id));
        }
        if returned <= 0 || returned > remaining {
            return Err(BookingError::InvalidQuantity(format!(
                "returned quantity must be within 1..={remaining}, got {returned}"
            )));
        }

        line.returned_qty += returned;
        if line.returned_qty >= line.qty {
            line.completed = true;
            if line.completed_at.is_none() {
                line.completed_at = Some(now);
            }
        }

        Ok(AppliedReturn {
            dispatched_qty: line.qty,
            rate: line.rate,
            completed: line.completed,
        })
    }

    /// Route a returned quantity: repay the line's recorded pool debts in
    /// their original drain order, then send the remainder to owned stock.
    ///
    /// Decrements the usage records, so replays cannot repay the same debt twice.
    pub fn settle_borrowed(
        &mut self,
        product_id: ProductId,
        returned: i64,
    ) -> Result<BorrowedSettlement, BookingError> {
        let line = self
            .target_line_mut(product_id)
            .ok_or(BookingError::LineNotFound(product_id))?;

        let mut left = returned;
        let mut pool_credits = Vec::new();
        for usage in line.borrowed_usages.iter_mut() {
            if left == 0 {
                break;
            }
            if usage.quantity <= 0 {
                continue;
            }
            let take = usage.quantity.min(left);
            usage.quantity -= take;
            left -= take;
            pool_credits.push(PoolCredit {
                pool_id: usage.pool_id,
                quantity: take,
            });
        }

        Ok(BorrowedSettlement {
            pool_credits,
            owned_credit: left,
        })
    }

    /// Append a processed-return snapshot.
    pub fn record_return(&mut self, record: ReturnRecord) -> Result<(), BookingError> {
        self.ensure_open()?;
        self.returns.push(record);
        Ok(())
    }

    /// Close the booking once every target line is completed (vacuously true
    /// for an empty target). One-way terminal transition; returns whether the
    /// booking closed on this call.
    pub fn close_if_complete(&mut self) -> bool {
        if self.return_closed {
            return false;
        }
        if self.target_lines().iter().all(|l| l.completed) {
            self.status = BookingStatus::Returned;
            self.return_closed = true;
            return true;
        }
        false
    }

    pub fn set_return_summary(&mut self, summary: ReturnSummary) {
        self.last_return_summary = Some(summary);
    }
}

impl Entity for Booking {
    type Id = BookingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_inventory::BorrowedUsage;

    fn test_booking() -> Booking {
        Booking::new(BookingId::new(), ClientId::new(), Utc::now())
    }

    fn line(product_id: ProductId, qty: i64, usages: Vec<BorrowedUsage>) -> DispatchLine {
        DispatchLine::new(product_id, "Tent 5x5", "pcs", qty, 1000, 0, usages)
    }

    fn usage(pool_id: PoolId, qty: i64) -> BorrowedUsage {
        BorrowedUsage {
            pool_id,
            supplier: "Acme".to_string(),
            unit_price: 500,
            quantity: qty,
        }
    }

    fn dispatched_booking(product_id: ProductId, qty: i64, usages: Vec<BorrowedUsage>) -> Booking {
        let mut b = test_booking();
        let record = DispatchRecord::new(DispatchId::new(), vec![line(product_id, qty, usages)], Utc::now());
        b.record_dispatch(record).unwrap();
        b
    }

    #[test]
    fn reservation_moves_new_to_reserved_and_keeps_drafts() {
        let mut b = test_booking();
        let record = DispatchRecord::new(DispatchId::new(), vec![line(ProductId::new(), 2, vec![])], Utc::now());
        b.record_reservation(record.clone()).unwrap();
        assert_eq!(b.status(), BookingStatus::Reserved);
        assert_eq!(b.dispatch_drafts().len(), 1);
        assert!(b.dispatches().is_empty());
        assert!(b.active_dispatch().is_none());

        // A second reservation stacks another draft.
        b.record_reservation(record).unwrap();
        assert_eq!(b.dispatch_drafts().len(), 2);
    }

    #[test]
    fn dispatch_sets_active_pointer_and_status() {
        let pid = ProductId::new();
        let b = dispatched_booking(pid, 3, vec![]);
        assert_eq!(b.status(), BookingStatus::Dispatched);
        assert_eq!(b.dispatches().len(), 1);
        assert_eq!(b.active_dispatch(), Some(b.dispatches()[0].id));
        assert_eq!(b.target_lines().len(), 1);
    }

    #[test]
    fn cannot_dispatch_twice() {
        let mut b = dispatched_booking(ProductId::new(), 3, vec![]);
        let record = DispatchRecord::new(DispatchId::new(), vec![], Utc::now());
        let err = b.record_dispatch(record.clone()).unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        let err = b.record_reservation(record).unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[test]
    fn returns_target_selections_when_nothing_was_dispatched() {
        let pid = ProductId::new();
        let mut b = test_booking();
        b.add_selection(line(pid, 2, vec![])).unwrap();
        let applied = b.apply_line_return(pid, 2, Utc::now()).unwrap();
        assert!(applied.completed);
    }

    #[test]
    fn partial_returns_accumulate_and_complete_once() {
        let pid = ProductId::new();
        let mut b = dispatched_booking(pid, 5, vec![]);

        let t1 = Utc::now();
        let applied = b.apply_line_return(pid, 2, t1).unwrap();
        assert!(!applied.completed);
        assert_eq!(b.target_lines()[0].returned_qty, 2);
        assert_eq!(b.target_lines()[0].completed_at, None);

        let t2 = Utc::now();
        let applied = b.apply_line_return(pid, 3, t2).unwrap();
        assert!(applied.completed);
        assert_eq!(b.target_lines()[0].returned_qty, 5);
        assert_eq!(b.target_lines()[0].completed_at, Some(t2));
    }

    #[test]
    fn completed_line_rejects_any_further_return() {
        let pid = ProductId::new();
        let mut b = dispatched_booking(pid, 2, vec![]);
        b.apply_line_return(pid, 2, Utc::now()).unwrap();

        let err = b.apply_line_return(pid, 1, Utc::now()).unwrap_err();
        assert_eq!(err, BookingError::LineAlreadyReturned(pid));
    }

    #[test]
    fn over_and_non_positive_returns_are_rejected() {
        let pid = ProductId::new();
        let mut b = dispatched_booking(pid, 3, vec![]);
        assert!(matches!(
            b.apply_line_return(pid, 4, Utc::now()),
            Err(BookingError::InvalidQuantity(_))
        ));
        assert!(matches!(
            b.apply_line_return(pid, 0, Utc::now()),
            Err(BookingError::InvalidQuantity(_))
        ));
        assert!(matches!(
            b.apply_line_return(ProductId::new(), 1, Utc::now()),
            Err(BookingError::LineNotFound(_))
        ));
    }

    #[test]
    fn settlement_repays_pools_in_drain_order_before_owned() {
        let pid = ProductId::new();
        let pool_a = PoolId::new();
        let pool_b = PoolId::new();
        let mut b = dispatched_booking(pid, 10, vec![usage(pool_a, 3), usage(pool_b, 2)]);

        // First 4 back: 3 to pool A, 1 to pool B, nothing owned.
        let s = b.settle_borrowed(pid, 4).unwrap();
        assert_eq!(
            s.pool_credits,
            vec![
                PoolCredit { pool_id: pool_a, quantity: 3 },
                PoolCredit { pool_id: pool_b, quantity: 1 },
            ]
        );
        assert_eq!(s.owned_credit, 0);

        // Remaining 6: last pool debt first, rest to owned stock.
        let s = b.settle_borrowed(pid, 6).unwrap();
        assert_eq!(s.pool_credits, vec![PoolCredit { pool_id: pool_b, quantity: 1 }]);
        assert_eq!(s.owned_credit, 5);

        // All debts settled now.
        let s = b.settle_borrowed(pid, 2).unwrap();
        assert!(s.pool_credits.is_empty());
        assert_eq!(s.owned_credit, 2);
    }

    #[test]
    fn closing_is_one_way_and_blocks_everything() {
        let pid = ProductId::new();
        let mut b = dispatched_booking(pid, 1, vec![]);
        b.apply_line_return(pid, 1, Utc::now()).unwrap();

        assert!(b.close_if_complete());
        assert_eq!(b.status(), BookingStatus::Returned);
        assert!(b.return_closed());
        // Second call is a no-op.
        assert!(!b.close_if_complete());

        let record = DispatchRecord::new(DispatchId::new(), vec![], Utc::now());
        assert_eq!(b.record_dispatch(record.clone()).unwrap_err(), BookingError::Closed);
        assert_eq!(b.record_reservation(record).unwrap_err(), BookingError::Closed);
        assert_eq!(
            b.apply_line_return(pid, 1, Utc::now()).unwrap_err(),
            BookingError::Closed
        );
    }

    #[test]
    fn incomplete_lines_keep_the_booking_open() {
        let pid = ProductId::new();
        let mut b = dispatched_booking(pid, 5, vec![]);
        b.apply_line_return(pid, 3, Utc::now()).unwrap();
        assert!(!b.close_if_complete());
        assert_eq!(b.status(), BookingStatus::Dispatched);
        assert!(!b.return_closed());
    }

    #[test]
    fn confirm_only_from_new() {
        let mut b = test_booking();
        b.confirm().unwrap();
        assert_eq!(b.status(), BookingStatus::Confirmed);
        assert!(matches!(
            b.confirm(),
            Err(BookingError::InvalidTransition { .. })
        ));
    }
}
