//! Inventory domain module.
//!
//! This crate contains business rules for rental stock, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). The central piece
//! is the stock allocator: given a requested quantity it decides how much is
//! drawn from owned stock and how much from borrowed (B2B) pools.

pub mod allocator;
pub mod pool;
pub mod product;

pub use allocator::{Allocation, BorrowedUsage, StockError, plan, commit};
pub use pool::BorrowedPool;
pub use product::{Product, normalized_name};
