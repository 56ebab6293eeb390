use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use canopy_bookings::Booking;
use canopy_core::{BookingId, ClientId, Entity, PoolId, ProductId};
use canopy_inventory::{BorrowedPool, Product};
use canopy_parties::{Client, LeadPriority};

use crate::audit::AuditEntry;
use crate::ledger::{InventoryTransaction, StockLedgerEntry};

use super::r#trait::{Guard, StockStore, StoreError, Versioned, WriteBatch};

/// In-memory versioned document store.
///
/// Intended for tests/dev. A single `RwLock` stands in for the backend's
/// transaction boundary: `commit` validates every version check under the
/// write lock before applying anything, so a batch is observed either fully
/// or not at all.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<ProductId, Versioned<Product>>,
    pools: HashMap<PoolId, Versioned<BorrowedPool>>,
    bookings: HashMap<BookingId, Versioned<Booking>>,
    clients: HashMap<ClientId, Versioned<Client>>,
    leads: HashMap<String, Versioned<LeadPriority>>,
    audit: Vec<AuditEntry>,
    ledger: Vec<StockLedgerEntry>,
    transactions: Vec<InventoryTransaction>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

fn insert_new<K, V>(
    map: &mut HashMap<K, Versioned<V>>,
    key: K,
    doc: V,
    what: &str,
) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + core::fmt::Debug,
{
    if map.contains_key(&key) {
        return Err(StoreError::Duplicate(format!("{what} {key:?}")));
    }
    map.insert(key, Versioned::new(doc, 1));
    Ok(())
}

fn check_version<K, V>(
    map: &HashMap<K, Versioned<V>>,
    key: &K,
    expected: u64,
    what: &str,
) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + core::fmt::Debug,
{
    match map.get(key) {
        Some(current) if current.version == expected => Ok(()),
        Some(current) => Err(StoreError::Conflict(format!(
            "{what} {key:?}: expected version {expected}, found {}",
            current.version
        ))),
        None => Err(StoreError::Conflict(format!(
            "{what} {key:?}: document vanished (expected version {expected})"
        ))),
    }
}

fn no_batch_duplicates<T: Entity>(docs: &[Versioned<T>], what: &str) -> Result<(), StoreError> {
    for (i, a) in docs.iter().enumerate() {
        if docs[i + 1..].iter().any(|b| b.doc.id() == a.doc.id()) {
            return Err(StoreError::Backend(format!(
                "batch contains the same {what} twice"
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;
        insert_new(&mut inner.products, product.id, product, "product")
    }

    async fn insert_pool(&self, pool: BorrowedPool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;
        insert_new(&mut inner.pools, pool.id, pool, "pool")
    }

    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;
        insert_new(&mut inner.clients, client.id, client, "client")
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;
        insert_new(&mut inner.bookings, booking.id_typed(), booking, "booking")
    }

    async fn set_lead_priority(
        &self,
        phone: &str,
        priority: LeadPriority,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;
        let next_version = inner.leads.get(phone).map(|v| v.version + 1).unwrap_or(1);
        inner
            .leads
            .insert(phone.to_string(), Versioned::new(priority, next_version));
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Versioned<Product>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner.products.get(&id).cloned())
    }

    async fn pool(&self, id: PoolId) -> Result<Option<Versioned<BorrowedPool>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner.pools.get(&id).cloned())
    }

    async fn pools_for_product(
        &self,
        product_id: ProductId,
        name_key: &str,
    ) -> Result<Vec<Versioned<BorrowedPool>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner
            .pools
            .values()
            .filter(|v| v.doc.available_qty > 0 && v.doc.matches(product_id, name_key))
            .cloned()
            .collect())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Versioned<Booking>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner.bookings.get(&id).cloned())
    }

    async fn client(&self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner.clients.get(&id).cloned())
    }

    async fn lead_priority(
        &self,
        phone: &str,
    ) -> Result<Option<Versioned<LeadPriority>>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner.leads.get(phone).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| lock_poisoned())?;

        no_batch_duplicates(&batch.products, "product")?;
        no_batch_duplicates(&batch.pools, "pool")?;
        no_batch_duplicates(&batch.bookings, "booking")?;

        // Validate every version check before touching anything.
        for p in &batch.products {
            check_version(&inner.products, &p.doc.id, p.version, "product")?;
        }
        for p in &batch.pools {
            check_version(&inner.pools, &p.doc.id, p.version, "pool")?;
        }
        for b in &batch.bookings {
            check_version(&inner.bookings, &b.doc.id_typed(), b.version, "booking")?;
        }
        for guard in &batch.guards {
            match guard {
                Guard::LeadPriority { phone, version } => {
                    check_version(&inner.leads, phone, *version, "lead")?;
                }
            }
        }

        // All checks passed; apply with bumped versions and append the rows.
        for p in batch.products {
            inner
                .products
                .insert(p.doc.id, Versioned::new(p.doc, p.version + 1));
        }
        for p in batch.pools {
            inner
                .pools
                .insert(p.doc.id, Versioned::new(p.doc, p.version + 1));
        }
        for b in batch.bookings {
            inner
                .bookings
                .insert(b.doc.id_typed(), Versioned::new(b.doc, b.version + 1));
        }
        inner.audit.extend(batch.audit);
        inner.ledger.extend(batch.ledger);
        inner.transactions.extend(batch.transactions);

        Ok(())
    }

    async fn audit_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn ledger_for(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn transactions_for(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        let inner = self.inner.read().map_err(|_| lock_poisoned())?;
        Ok(inner
            .transactions
            .iter()
            .filter(|e| e.booking_id == Some(booking_id))
            .cloned()
            .collect())
    }
}
