//! Booking domain module.
//!
//! A booking is an event reservation with a fulfillment lifecycle: stock is
//! planned (`selections`), previewed (`dispatch_drafts`), committed
//! (`dispatches`) and eventually brought back (`returns`). All four history
//! collections are append-only; the mutable per-line counters
//! (`returned_qty`, borrowed-usage debts) only ever move toward settlement.

pub mod booking;
pub mod line;

pub use booking::{AppliedReturn, Booking, BookingError, BookingStatus, BorrowedSettlement, PoolCredit};
pub use line::{
    DispatchLine, DispatchRecord, ReturnLine, ReturnRecord, ReturnSummary, ReturnSummaryTotals,
    ReturnTotals,
};
