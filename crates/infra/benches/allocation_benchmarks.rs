use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use canopy_core::{PoolId, ProductId};
use canopy_inventory::{BorrowedPool, Product, commit, plan};

fn product(owned: i64) -> Product {
    Product::new(ProductId::new(), "Tent 5x5", "pcs", 1000, Some(800), owned).unwrap()
}

fn pools(count: usize, qty_each: i64) -> Vec<BorrowedPool> {
    (0..count)
        .map(|i| {
            BorrowedPool::new(
                PoolId::new(),
                None,
                "Tent 5x5",
                format!("Supplier {i}"),
                500,
                qty_each,
                Utc::now(),
            )
            .unwrap()
        })
        .collect()
}

fn bench_plan(c: &mut Criterion) {
    let product = product(50);
    let pools = pools(100, 10);

    c.bench_function("plan_across_100_pools", |b| {
        b.iter(|| plan(black_box(&product), black_box(&pools), black_box(900)).unwrap())
    });
}

fn bench_commit(c: &mut Criterion) {
    let base_product = product(50);
    let base_pools = pools(100, 10);
    let now = Utc::now();

    c.bench_function("commit_across_100_pools", |b| {
        b.iter(|| {
            let mut product = base_product.clone();
            let mut pools = base_pools.clone();
            commit(
                black_box(&mut product),
                black_box(&mut pools),
                black_box(900),
                now,
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_plan, bench_commit);
criterion_main!(benches);
