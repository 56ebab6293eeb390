//! Orchestrating workflows: dispatch and return.
//!
//! Each workflow attempt is a pure function of fresh snapshot reads that ends
//! in one atomic [`WriteBatch`](crate::store::WriteBatch) commit. Commit-time
//! version conflicts surface as [`FulfillmentError::Transient`] and are
//! absorbed by the retry coordinator; every other failure is deterministic
//! and fails the whole request without side effects.

mod dispatch;
mod returns;

pub use dispatch::{DispatchOutcome, DispatchRequest, DispatchWorkflow, RequestedLine};
pub use returns::{ReturnLineOutcome, ReturnLineRequest, ReturnOutcome, ReturnRequest, ReturnWorkflow};

use std::collections::HashSet;

use thiserror::Error;

use canopy_bookings::{Booking, BookingError};
use canopy_core::{ClientId, ProductId};
use canopy_parties::Client;

use crate::retry::Retryable;
use crate::store::{Guard, StockStore, StoreError, Versioned};

/// Failures a fulfillment operation can surface to callers.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Combined owned + borrowed supply cannot cover a requested line.
    #[error("insufficient stock for '{product_name}': requested {requested}, short by {shortage}")]
    Insufficient {
        product_id: ProductId,
        product_name: String,
        requested: i64,
        shortage: i64,
    },

    /// The booking's client is a cold lead; commitments are disabled.
    #[error("cold lead: fulfillment actions are disabled for this client")]
    ColdLeadBlocked,

    /// The booking is fully returned and closed.
    #[error("booking is already fully returned")]
    AlreadyReturned,

    /// Idempotency guard: the targeted line has nothing left to return.
    #[error("line for product {0} is already fully returned")]
    AlreadyReturnedLine(ProductId),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A concurrent writer won the commit race; the attempt can be re-run.
    #[error("transient conflict: {0}")]
    Transient(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => FulfillmentError::Transient(msg),
            other => FulfillmentError::Store(other),
        }
    }
}

impl From<BookingError> for FulfillmentError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Closed => FulfillmentError::AlreadyReturned,
            BookingError::LineNotFound(id) => {
                FulfillmentError::NotFound(format!("no dispatched line for product {id}"))
            }
            BookingError::LineAlreadyReturned(id) => FulfillmentError::AlreadyReturnedLine(id),
            BookingError::InvalidQuantity(msg) => FulfillmentError::InvalidQuantity(msg),
            BookingError::InvalidTransition { .. } => {
                FulfillmentError::InvalidState(err.to_string())
            }
        }
    }
}

impl Retryable for FulfillmentError {
    fn is_transient(&self) -> bool {
        matches!(self, FulfillmentError::Transient(_))
    }
}

fn reject_duplicate_products(ids: impl Iterator<Item = ProductId>) -> Result<(), FulfillmentError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(FulfillmentError::InvalidQuantity(format!(
                "product {id} appears more than once in the request"
            )));
        }
    }
    Ok(())
}

/// Load the booking's client and enforce the cold-lead gate.
///
/// Reads the client's lead record by phone; a `cold` priority rejects the
/// operation. Returns the client together with the guard that pins the lead's
/// version into the commit, so a priority flipped to cold mid-flight fails
/// the batch instead of slipping through.
async fn cold_lead_gate(
    store: &dyn StockStore,
    client_id: ClientId,
) -> Result<(Versioned<Client>, Vec<Guard>), FulfillmentError> {
    let client = store
        .client(client_id)
        .await?
        .ok_or_else(|| FulfillmentError::NotFound(format!("client {client_id}")))?;

    let mut guards = Vec::new();
    if let Some(lead) = store.lead_priority(&client.doc.phone).await? {
        if lead.doc.blocks_commitments() {
            return Err(FulfillmentError::ColdLeadBlocked);
        }
        guards.push(Guard::LeadPriority {
            phone: client.doc.phone.clone(),
            version: lead.version,
        });
    }
    Ok((client, guards))
}

async fn load_booking(
    store: &dyn StockStore,
    id: canopy_core::BookingId,
) -> Result<Versioned<Booking>, FulfillmentError> {
    store
        .booking(id)
        .await?
        .ok_or_else(|| FulfillmentError::NotFound(format!("booking {id}")))
}
