use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use canopy_core::{DomainError, Entity, PoolId, ProductId};

/// A named, possibly product-linked supply of externally-sourced stock.
///
/// Pools are overflow capacity: the allocator drains them only after owned
/// stock is exhausted, and returns repay them before owned stock is credited.
/// Several pools may exist for the same product (different suppliers/batches);
/// a pool links to a product either directly by id or by normalized item name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedPool {
    pub id: PoolId,
    pub product_id: Option<ProductId>,
    /// Normalized item name, the fallback matching key when `product_id` is unset.
    pub item_name: String,
    pub supplier: String,
    /// Per-unit borrow price in smallest currency unit.
    pub unit_price: u64,
    pub available_qty: i64,
    /// When this pool was last drained; drives fairness ordering.
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BorrowedPool {
    pub fn new(
        id: PoolId,
        product_id: Option<ProductId>,
        item_name: impl Into<String>,
        supplier: impl Into<String>,
        unit_price: u64,
        available_qty: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if available_qty < 0 {
            return Err(DomainError::validation("available_qty cannot be negative"));
        }
        Ok(Self {
            id,
            product_id,
            item_name: crate::product::normalized_name(&item_name.into()),
            supplier: supplier.into(),
            unit_price,
            available_qty,
            last_used_at: None,
            created_at,
        })
    }

    /// Whether this pool supplies the given product.
    pub fn matches(&self, product_id: ProductId, name_key: &str) -> bool {
        match self.product_id {
            Some(id) => id == product_id,
            None => self.item_name == name_key,
        }
    }

    /// Drain up to `qty` units, marking the pool as used. Returns the amount taken.
    pub fn drain(&mut self, qty: i64, now: DateTime<Utc>) -> i64 {
        let take = qty.min(self.available_qty).max(0);
        self.available_qty -= take;
        if take > 0 {
            self.last_used_at = Some(now);
        }
        take
    }

    /// Credit units back (repayment on return).
    pub fn repay(&mut self, qty: i64) -> Result<(), DomainError> {
        if qty < 0 {
            return Err(DomainError::validation("repay quantity must be non-negative"));
        }
        self.available_qty += qty;
        Ok(())
    }
}

impl Entity for BorrowedPool {
    type Id = PoolId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
