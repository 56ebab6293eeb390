//! `canopy-infra` — infrastructure for the fulfillment engine.
//!
//! This crate hosts everything that sits between the pure domain crates and
//! the HTTP layer: the transactional store boundary (versioned documents with
//! compare-and-swap commits), the bounded retry coordinator that absorbs
//! transient write conflicts, the append-only audit/ledger records, and the
//! two orchestrating workflows (dispatch and return).

pub mod audit;
pub mod ledger;
pub mod retry;
pub mod store;
pub mod workflows;
