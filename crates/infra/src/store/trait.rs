use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use canopy_bookings::Booking;
use canopy_core::{BookingId, ClientId, PoolId, ProductId};
use canopy_inventory::{BorrowedPool, Product};
use canopy_parties::{Client, LeadPriority};

use crate::audit::AuditEntry;
use crate::ledger::{InventoryTransaction, StockLedgerEntry};

/// A document together with the store version it was read at.
///
/// The version is the optimistic-concurrency token: a commit carrying this
/// document succeeds only if the stored version still matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub doc: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(doc: T, version: u64) -> Self {
        Self { doc, version }
    }
}

/// Store operation error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A version check failed at commit time (concurrent writer won).
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Insert of a document whose id already exists.
    #[error("duplicate document: {0}")]
    Duplicate(String),

    /// Backend failure (IO, serialization, connectivity).
    #[error("storage failure: {0}")]
    Backend(String),
}

/// A read guard: a document that must still be at the observed version for
/// the batch to commit, without being written itself. Used to keep policy
/// reads (the cold-lead gate) consistent with concurrent edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    LeadPriority { phone: String, version: u64 },
}

/// Everything one workflow attempt wants to persist, committed atomically.
#[derive(Debug, Default)]
pub struct WriteBatch {
    pub products: Vec<Versioned<Product>>,
    pub pools: Vec<Versioned<BorrowedPool>>,
    pub bookings: Vec<Versioned<Booking>>,
    pub guards: Vec<Guard>,
    pub audit: Vec<AuditEntry>,
    pub ledger: Vec<StockLedgerEntry>,
    pub transactions: Vec<InventoryTransaction>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.pools.is_empty()
            && self.bookings.is_empty()
            && self.audit.is_empty()
            && self.ledger.is_empty()
            && self.transactions.is_empty()
    }
}

/// Versioned document store for the fulfillment engine.
///
/// Implementations must make `commit` atomic: either every document write,
/// guard check, and append succeeds, or nothing is persisted. Version checks
/// compare the batch's expected versions against current storage; any
/// mismatch fails the batch with [`StoreError::Conflict`].
#[async_trait]
pub trait StockStore: Send + Sync {
    // Setup/ingest paths (plain inserts, no version expectations).
    async fn insert_product(&self, product: Product) -> Result<(), StoreError>;
    async fn insert_pool(&self, pool: BorrowedPool) -> Result<(), StoreError>;
    async fn insert_client(&self, client: Client) -> Result<(), StoreError>;
    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError>;
    /// Upsert the lead priority for a phone number (bumps its version).
    async fn set_lead_priority(&self, phone: &str, priority: LeadPriority)
    -> Result<(), StoreError>;

    // Snapshot reads.
    async fn product(&self, id: ProductId) -> Result<Option<Versioned<Product>>, StoreError>;
    async fn pool(&self, id: PoolId) -> Result<Option<Versioned<BorrowedPool>>, StoreError>;
    /// Pools with positive availability supplying the given product, linked
    /// by id or by normalized item name. Order is unspecified; the allocator
    /// applies the fairness ordering itself.
    async fn pools_for_product(
        &self,
        product_id: ProductId,
        name_key: &str,
    ) -> Result<Vec<Versioned<BorrowedPool>>, StoreError>;
    async fn booking(&self, id: BookingId) -> Result<Option<Versioned<Booking>>, StoreError>;
    async fn client(&self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError>;
    async fn lead_priority(&self, phone: &str)
    -> Result<Option<Versioned<LeadPriority>>, StoreError>;

    /// Atomic compare-and-swap commit of a whole batch.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    // Append-only row reads (reporting/traceability).
    async fn audit_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, StoreError>;
    async fn ledger_for(&self, product_id: ProductId)
    -> Result<Vec<StockLedgerEntry>, StoreError>;
    async fn transactions_for(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<InventoryTransaction>, StoreError>;
}
