//! Stock allocator: decides how a requested quantity is funded.
//!
//! Owned stock is consumed first; any remainder is drawn greedily from the
//! borrowed pools linked to the product, oldest-touched pool first. The
//! dry-run path (`plan`) computes the same split without mutating anything,
//! which is what makes non-committing reservations safe under concurrency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use canopy_core::PoolId;

use crate::pool::BorrowedPool;
use crate::product::Product;

/// One pool's contribution to an allocation, in drain order.
///
/// Recorded on the dispatch line so a later return can settle its debt to the
/// exact pools it drew from. `quantity` is the outstanding amount still owed
/// to the pool; return processing decrements it as it repays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowedUsage {
    pub pool_id: PoolId,
    pub supplier: String,
    pub unit_price: u64,
    pub quantity: i64,
}

/// Outcome of an allocation (projection or committed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub owned_used: i64,
    pub borrowed_used: i64,
    pub borrowed_usages: Vec<BorrowedUsage>,
    /// Owned quantity after the debit (projected for dry-runs, actual otherwise).
    pub projected_owned_qty: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("requested quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// Owned + borrowed supply cannot cover the request.
    ///
    /// Reports the quantities available at decision time so callers can compute
    /// the exact shortage (`requested - owned_available - borrowed_available`).
    #[error("insufficient stock: requested {requested}, owned {owned_available}, borrowed {borrowed_available}")]
    Insufficient {
        requested: i64,
        owned_available: i64,
        borrowed_available: i64,
    },
}

impl StockError {
    /// Exact uncoverable quantity for an `Insufficient` failure.
    pub fn shortage(&self) -> Option<i64> {
        match self {
            StockError::Insufficient {
                requested,
                owned_available,
                borrowed_available,
            } => Some(requested - owned_available - borrowed_available),
            _ => None,
        }
    }
}

/// Dry-run allocation: computes the split without touching product or pools.
pub fn plan(
    product: &Product,
    pools: &[BorrowedPool],
    requested: i64,
) -> Result<Allocation, StockError> {
    allocate(product, pools, requested).map(|planned| planned.allocation)
}

/// Committing allocation: applies the owned debit and each pool's debit,
/// stamping `last_used_at` on every drained pool.
pub fn commit(
    product: &mut Product,
    pools: &mut [BorrowedPool],
    requested: i64,
    now: DateTime<Utc>,
) -> Result<Allocation, StockError> {
    let planned = allocate(product, pools, requested)?;

    // The plan already proved the debits fit, so these cannot fail.
    product.owned_qty -= planned.allocation.owned_used;
    for usage in &planned.allocation.borrowed_usages {
        let pool = pools
            .iter_mut()
            .find(|p| p.id == usage.pool_id)
            .expect("planned usage references a pool from the input slice");
        pool.available_qty -= usage.quantity;
        pool.last_used_at = Some(now);
    }

    Ok(planned.allocation)
}

struct Planned {
    allocation: Allocation,
}

fn allocate(
    product: &Product,
    pools: &[BorrowedPool],
    requested: i64,
) -> Result<Planned, StockError> {
    if requested <= 0 {
        return Err(StockError::InvalidQuantity(requested));
    }

    let owned_available = product.owned_qty;
    let owned_used = owned_available.min(requested);
    let mut remaining = requested - owned_used;

    // Fairness ordering: oldest-touched pool first (never-used pools sort
    // before any used one), creation order as the tie-break.
    let mut order: Vec<&BorrowedPool> = pools.iter().filter(|p| p.available_qty > 0).collect();
    order.sort_by(|a, b| {
        a.last_used_at
            .cmp(&b.last_used_at)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut borrowed_usages = Vec::new();
    for pool in &order {
        if remaining == 0 {
            break;
        }
        let take = pool.available_qty.min(remaining);
        remaining -= take;
        borrowed_usages.push(BorrowedUsage {
            pool_id: pool.id,
            supplier: pool.supplier.clone(),
            unit_price: pool.unit_price,
            quantity: take,
        });
    }

    if remaining > 0 {
        return Err(StockError::Insufficient {
            requested,
            owned_available,
            borrowed_available: order.iter().map(|p| p.available_qty).sum(),
        });
    }

    let borrowed_used = requested - owned_used;
    Ok(Planned {
        allocation: Allocation {
            owned_used,
            borrowed_used,
            borrowed_usages,
            projected_owned_qty: owned_available - owned_used,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{PoolId, ProductId};
    use chrono::{Duration, Utc};

    fn product(owned: i64) -> Product {
        Product::new(ProductId::new(), "Tent 5x5", "pcs", 1000, Some(8000), owned).unwrap()
    }

    fn pool(qty: i64, supplier: &str, created_offset_secs: i64) -> BorrowedPool {
        BorrowedPool::new(
            PoolId::new(),
            None,
            "Tent 5x5",
            supplier,
            500,
            qty,
            Utc::now() + Duration::seconds(created_offset_secs),
        )
        .unwrap()
    }

    #[test]
    fn owned_stock_covers_the_request_when_sufficient() {
        let p = product(10);
        let alloc = plan(&p, &[], 7).unwrap();
        assert_eq!(alloc.owned_used, 7);
        assert_eq!(alloc.borrowed_used, 0);
        assert!(alloc.borrowed_usages.is_empty());
        assert_eq!(alloc.projected_owned_qty, 3);
    }

    #[test]
    fn overflow_spills_into_pools() {
        let p = product(5);
        let pools = vec![pool(3, "Acme", 0)];
        let alloc = plan(&p, &pools, 7).unwrap();
        assert_eq!(alloc.owned_used, 5);
        assert_eq!(alloc.borrowed_used, 2);
        assert_eq!(alloc.borrowed_usages.len(), 1);
        assert_eq!(alloc.borrowed_usages[0].quantity, 2);
        assert_eq!(alloc.projected_owned_qty, 0);
    }

    #[test]
    fn insufficient_supply_reports_exact_availability() {
        let p = product(5);
        let pools = vec![pool(3, "Acme", 0)];
        let err = plan(&p, &pools, 10).unwrap_err();
        assert_eq!(
            err,
            StockError::Insufficient {
                requested: 10,
                owned_available: 5,
                borrowed_available: 3,
            }
        );
        assert_eq!(err.shortage(), Some(2));
    }

    #[test]
    fn plan_never_mutates_inputs() {
        let p = product(5);
        let pools = vec![pool(3, "Acme", 0)];
        let before_p = p.clone();
        let before_pools = pools.clone();
        let _ = plan(&p, &pools, 7).unwrap();
        let _ = plan(&p, &pools, 100).unwrap_err();
        assert_eq!(p, before_p);
        assert_eq!(pools, before_pools);
    }

    #[test]
    fn commit_applies_debits_and_marks_pools_used() {
        let mut p = product(5);
        let mut pools = vec![pool(3, "Acme", 0)];
        let now = Utc::now();
        let alloc = commit(&mut p, &mut pools, 7, now).unwrap();
        assert_eq!(alloc.owned_used, 5);
        assert_eq!(alloc.borrowed_used, 2);
        assert_eq!(p.owned_qty, 0);
        assert_eq!(pools[0].available_qty, 1);
        assert_eq!(pools[0].last_used_at, Some(now));
    }

    #[test]
    fn commit_failure_leaves_everything_untouched() {
        let mut p = product(5);
        let mut pools = vec![pool(3, "Acme", 0)];
        let before_p = p.clone();
        let before_pools = pools.clone();
        assert!(commit(&mut p, &mut pools, 10, Utc::now()).is_err());
        assert_eq!(p, before_p);
        assert_eq!(pools, before_pools);
    }

    #[test]
    fn never_used_pools_drain_before_recently_used_ones() {
        let p = product(0);
        let mut fresh = pool(5, "Fresh", 10);
        let mut used = pool(5, "Used", 0);
        used.last_used_at = Some(Utc::now());
        // Creation order favors "used", but usage recency must win.
        let pools = vec![used.clone(), fresh.clone()];
        let alloc = plan(&p, &pools, 3).unwrap();
        assert_eq!(alloc.borrowed_usages[0].supplier, "Fresh");
        assert_eq!(alloc.borrowed_usages[0].quantity, 3);

        // Tie on last_used_at falls back to creation order.
        fresh.last_used_at = None;
        used.last_used_at = None;
        let pools = vec![fresh.clone(), used.clone()];
        let alloc = plan(&p, &pools, 8).unwrap();
        assert_eq!(alloc.borrowed_usages[0].supplier, "Used");
        assert_eq!(alloc.borrowed_usages[0].quantity, 5);
        assert_eq!(alloc.borrowed_usages[1].supplier, "Fresh");
        assert_eq!(alloc.borrowed_usages[1].quantity, 3);
    }

    #[test]
    fn non_positive_requests_are_rejected() {
        let p = product(5);
        assert!(matches!(
            plan(&p, &[], 0),
            Err(StockError::InvalidQuantity(0))
        ));
        assert!(matches!(
            plan(&p, &[], -2),
            Err(StockError::InvalidQuantity(-2))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn allocation_conserves_quantities(
                owned in 0i64..1000,
                pool_qtys in proptest::collection::vec(0i64..200, 0..6),
                requested in 1i64..2000,
            ) {
                let p = product(owned);
                let pools: Vec<BorrowedPool> = pool_qtys
                    .iter()
                    .enumerate()
                    .map(|(i, q)| pool(*q, "S", i as i64))
                    .collect();
                let borrowed_total: i64 = pool_qtys.iter().sum();

                match plan(&p, &pools, requested) {
                    Ok(alloc) => {
                        prop_assert!(requested <= owned + borrowed_total);
                        prop_assert_eq!(alloc.owned_used, owned.min(requested));
                        prop_assert_eq!(alloc.borrowed_used, requested - alloc.owned_used);
                        let usage_sum: i64 =
                            alloc.borrowed_usages.iter().map(|u| u.quantity).sum();
                        prop_assert_eq!(usage_sum, alloc.borrowed_used);
                        prop_assert_eq!(alloc.projected_owned_qty, owned - alloc.owned_used);
                        prop_assert!(alloc.projected_owned_qty >= 0);
                    }
                    Err(StockError::Insufficient { requested: r, owned_available, borrowed_available }) => {
                        prop_assert!(requested > owned + borrowed_total);
                        prop_assert_eq!(r, requested);
                        prop_assert_eq!(owned_available, owned);
                        prop_assert_eq!(borrowed_available, borrowed_total);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
            }

            #[test]
            fn commit_matches_plan_and_drains_exactly(
                owned in 0i64..100,
                pool_qtys in proptest::collection::vec(1i64..50, 1..5),
                requested in 1i64..200,
            ) {
                let mut p = product(owned);
                let mut pools: Vec<BorrowedPool> = pool_qtys
                    .iter()
                    .enumerate()
                    .map(|(i, q)| pool(*q, "S", i as i64))
                    .collect();
                let planned = plan(&p, &pools, requested);
                let committed = commit(&mut p, &mut pools, requested, Utc::now());

                match (planned, committed) {
                    (Ok(a), Ok(b)) => {
                        prop_assert_eq!(a, b.clone());
                        prop_assert_eq!(p.owned_qty, b.projected_owned_qty);
                        let drained: i64 = pool_qtys.iter().sum::<i64>()
                            - pools.iter().map(|x| x.available_qty).sum::<i64>();
                        prop_assert_eq!(drained, b.borrowed_used);
                    }
                    (Err(a), Err(b)) => prop_assert_eq!(a, b),
                    (a, b) => prop_assert!(false, "plan/commit disagree: {a:?} vs {b:?}"),
                }
            }
        }
    }
}
