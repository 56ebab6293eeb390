use serde::{Deserialize, Serialize};

use canopy_core::{DomainError, Entity, ProductId};

/// Owned-stock record for a rental product.
///
/// `owned_qty` is the quantity the business holds directly (main warehouse).
/// It is debited only by the allocator's committing path and credited only by
/// return processing; it can never go negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit: String,
    /// Reference rental rate in smallest currency unit (e.g., cents).
    pub rate: u64,
    /// Purchase/replacement price, used as the default loss price for shortages.
    pub buy_price: Option<u64>,
    pub owned_qty: i64,
}

impl Product {
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        unit: impl Into<String>,
        rate: u64,
        buy_price: Option<u64>,
        owned_qty: i64,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if owned_qty < 0 {
            return Err(DomainError::validation("owned_qty cannot be negative"));
        }
        Ok(Self {
            id,
            name,
            unit: unit.into(),
            rate,
            buy_price,
            owned_qty,
        })
    }

    /// Debit owned stock. Refuses to over-draw.
    pub fn debit_owned(&mut self, qty: i64) -> Result<(), DomainError> {
        if qty < 0 {
            return Err(DomainError::validation("debit quantity must be non-negative"));
        }
        if qty > self.owned_qty {
            return Err(DomainError::invariant("owned stock cannot go negative"));
        }
        self.owned_qty -= qty;
        Ok(())
    }

    /// Credit owned stock (return path).
    pub fn credit_owned(&mut self, qty: i64) -> Result<(), DomainError> {
        if qty < 0 {
            return Err(DomainError::validation("credit quantity must be non-negative"));
        }
        self.owned_qty += qty;
        Ok(())
    }

    /// Matching key used to link name-only borrowed pools to this product.
    pub fn name_key(&self) -> String {
        normalized_name(&self.name)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Normalize an item name for matching: trim, lowercase, collapse whitespace.
pub fn normalized_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_refuses_to_over_draw() {
        let mut p = Product::new(ProductId::new(), "Tent 5x5", "pcs", 1000, None, 3).unwrap();
        assert!(p.debit_owned(4).is_err());
        assert_eq!(p.owned_qty, 3);
        p.debit_owned(3).unwrap();
        assert_eq!(p.owned_qty, 0);
    }

    #[test]
    fn normalized_name_collapses_case_and_whitespace() {
        assert_eq!(normalized_name("  Tent   5x5 "), "tent 5x5");
        assert_eq!(normalized_name("TENT 5x5"), normalized_name("tent 5x5"));
    }

    #[test]
    fn negative_initial_stock_is_rejected() {
        assert!(Product::new(ProductId::new(), "Chair", "pcs", 100, None, -1).is_err());
    }
}
