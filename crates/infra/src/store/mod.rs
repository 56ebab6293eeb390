//! Transactional document store boundary.
//!
//! The engine treats its data store as a set of versioned documents with an
//! atomic, compare-and-swap batch commit. Workflows read a snapshot, decide,
//! and commit every touched document together with its expected version; a
//! stale version anywhere fails the whole batch, which the retry coordinator
//! turns into a fresh attempt. Append-only rows (audit, ledger, inventory
//! transactions) ride along in the same batch so they can never exist without
//! the state change they describe.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStockStore;
pub use r#trait::{Guard, StockStore, StoreError, Versioned, WriteBatch};
