//! Postgres-backed store: JSONB documents with a version column per table.
//!
//! `commit` maps the compare-and-swap contract onto a single database
//! transaction of `UPDATE ... WHERE id = $1 AND version = $2` statements; a
//! zero-row update means a concurrent writer won and the whole transaction
//! rolls back with [`StoreError::Conflict`].

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use canopy_bookings::Booking;
use canopy_core::{BookingId, ClientId, PoolId, ProductId};
use canopy_inventory::{BorrowedPool, Product};
use canopy_parties::{Client, LeadPriority};

use crate::audit::AuditEntry;
use crate::ledger::{InventoryTransaction, StockLedgerEntry};

use super::r#trait::{Guard, StockStore, StoreError, Versioned, WriteBatch};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS canopy_products (
        id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_pools (
        id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_bookings (
        id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_clients (
        id UUID PRIMARY KEY,
        doc JSONB NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_leads (
        phone TEXT PRIMARY KEY,
        doc JSONB NOT NULL,
        version BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_audit (
        id UUID PRIMARY KEY,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS canopy_audit_entity
        ON canopy_audit (entity_type, entity_id)",
    "CREATE TABLE IF NOT EXISTS canopy_ledger (
        id UUID PRIMARY KEY,
        product_id UUID NOT NULL,
        doc JSONB NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS canopy_transactions (
        id UUID PRIMARY KEY,
        booking_id UUID,
        doc JSONB NOT NULL
    )",
];

pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn insert_doc<T: serde::Serialize>(
        &self,
        table: &str,
        id: uuid::Uuid,
        doc: &T,
        what: &str,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_value(doc).map_err(backend)?;
        let sql = format!("INSERT INTO {table} (id, doc, version) VALUES ($1, $2, 1)");
        let result = sqlx::query(&sql).bind(id).bind(json).execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Duplicate(format!("{what} {id}")))
            }
            Err(err) => Err(backend(err)),
        }
    }

    async fn load_doc<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        id: uuid::Uuid,
    ) -> Result<Option<Versioned<T>>, StoreError> {
        let sql = format!("SELECT doc, version FROM {table} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(decode_versioned).transpose()
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn decode_versioned<T: serde::de::DeserializeOwned>(
    row: sqlx::postgres::PgRow,
) -> Result<Versioned<T>, StoreError> {
    let doc: serde_json::Value = row.try_get("doc").map_err(backend)?;
    let version: i64 = row.try_get("version").map_err(backend)?;
    let doc = serde_json::from_value(doc).map_err(backend)?;
    Ok(Versioned::new(doc, version as u64))
}

async fn cas_update<T: serde::Serialize>(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    table: &str,
    id: uuid::Uuid,
    item: &Versioned<T>,
    what: &str,
) -> Result<(), StoreError> {
    let json = serde_json::to_value(&item.doc).map_err(backend)?;
    let sql = format!(
        "UPDATE {table} SET doc = $2, version = version + 1 WHERE id = $1 AND version = $3"
    );
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(json)
        .bind(item.version as i64)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "{what} {id}: expected version {}",
            item.version
        )));
    }
    Ok(())
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        self.insert_doc("canopy_products", *product.id.as_uuid(), &product, "product")
            .await
    }

    async fn insert_pool(&self, pool: BorrowedPool) -> Result<(), StoreError> {
        self.insert_doc("canopy_pools", *pool.id.as_uuid(), &pool, "pool")
            .await
    }

    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        self.insert_doc("canopy_clients", *client.id.as_uuid(), &client, "client")
            .await
    }

    async fn insert_booking(&self, booking: Booking) -> Result<(), StoreError> {
        self.insert_doc(
            "canopy_bookings",
            *booking.id_typed().as_uuid(),
            &booking,
            "booking",
        )
        .await
    }

    async fn set_lead_priority(
        &self,
        phone: &str,
        priority: LeadPriority,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_value(priority).map_err(backend)?;
        sqlx::query(
            "INSERT INTO canopy_leads (phone, doc, version) VALUES ($1, $2, 1)
             ON CONFLICT (phone)
             DO UPDATE SET doc = EXCLUDED.doc, version = canopy_leads.version + 1",
        )
        .bind(phone)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Versioned<Product>>, StoreError> {
        self.load_doc("canopy_products", *id.as_uuid()).await
    }

    async fn pool(&self, id: PoolId) -> Result<Option<Versioned<BorrowedPool>>, StoreError> {
        self.load_doc("canopy_pools", *id.as_uuid()).await
    }

    async fn pools_for_product(
        &self,
        product_id: ProductId,
        name_key: &str,
    ) -> Result<Vec<Versioned<BorrowedPool>>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc, version FROM canopy_pools
             WHERE (doc->>'available_qty')::BIGINT > 0
               AND (doc->>'product_id' = $1
                    OR (doc->>'product_id' IS NULL AND doc->>'item_name' = $2))",
        )
        .bind(product_id.as_uuid().to_string())
        .bind(name_key)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(decode_versioned).collect()
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Versioned<Booking>>, StoreError> {
        self.load_doc("canopy_bookings", *id.as_uuid()).await
    }

    async fn client(&self, id: ClientId) -> Result<Option<Versioned<Client>>, StoreError> {
        self.load_doc("canopy_clients", *id.as_uuid()).await
    }

    async fn lead_priority(
        &self,
        phone: &str,
    ) -> Result<Option<Versioned<LeadPriority>>, StoreError> {
        let row = sqlx::query("SELECT doc, version FROM canopy_leads WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(decode_versioned).transpose()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for item in &batch.products {
            cas_update(&mut tx, "canopy_products", *item.doc.id.as_uuid(), item, "product")
                .await?;
        }
        for item in &batch.pools {
            cas_update(&mut tx, "canopy_pools", *item.doc.id.as_uuid(), item, "pool").await?;
        }
        for item in &batch.bookings {
            cas_update(
                &mut tx,
                "canopy_bookings",
                *item.doc.id_typed().as_uuid(),
                item,
                "booking",
            )
            .await?;
        }
        for guard in &batch.guards {
            match guard {
                Guard::LeadPriority { phone, version } => {
                    let row =
                        sqlx::query("SELECT version FROM canopy_leads WHERE phone = $1")
                            .bind(phone)
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(backend)?;
                    let current: Option<i64> =
                        row.map(|r| r.try_get("version")).transpose().map_err(backend)?;
                    if current != Some(*version as i64) {
                        return Err(StoreError::Conflict(format!(
                            "lead {phone}: expected version {version}"
                        )));
                    }
                }
            }
        }

        for entry in &batch.audit {
            let json = serde_json::to_value(entry).map_err(backend)?;
            sqlx::query(
                "INSERT INTO canopy_audit (id, entity_type, entity_id, doc)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(entry.id)
            .bind(&entry.entity_type)
            .bind(&entry.entity_id)
            .bind(json)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        for entry in &batch.ledger {
            let json = serde_json::to_value(entry).map_err(backend)?;
            sqlx::query("INSERT INTO canopy_ledger (id, product_id, doc) VALUES ($1, $2, $3)")
                .bind(entry.id)
                .bind(entry.product_id.as_uuid())
                .bind(json)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        for entry in &batch.transactions {
            let json = serde_json::to_value(entry).map_err(backend)?;
            sqlx::query(
                "INSERT INTO canopy_transactions (id, booking_id, doc) VALUES ($1, $2, $3)",
            )
            .bind(entry.id)
            .bind(entry.booking_id.map(|b| *b.as_uuid()))
            .bind(json)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn audit_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM canopy_audit
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY id",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(decode_doc).collect()
    }

    async fn ledger_for(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM canopy_ledger WHERE product_id = $1 ORDER BY id",
        )
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(decode_doc).collect()
    }

    async fn transactions_for(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<InventoryTransaction>, StoreError> {
        let rows = sqlx::query(
            "SELECT doc FROM canopy_transactions WHERE booking_id = $1 ORDER BY id",
        )
        .bind(booking_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(decode_doc).collect()
    }
}

fn decode_doc<T: serde::de::DeserializeOwned>(row: sqlx::postgres::PgRow) -> Result<T, StoreError> {
    let doc: serde_json::Value = row.try_get("doc").map_err(backend)?;
    serde_json::from_value(doc).map_err(backend)
}
