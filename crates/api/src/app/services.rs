use std::sync::Arc;

use canopy_infra::store::{InMemoryStockStore, StockStore};
use canopy_infra::workflows::{DispatchWorkflow, ReturnWorkflow};

/// Shared application services available to all route handlers.
pub struct AppServices {
    pub store: Arc<dyn StockStore>,
    pub dispatch: DispatchWorkflow,
    pub returns: ReturnWorkflow,
}

impl AppServices {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self {
            dispatch: DispatchWorkflow::new(store.clone()),
            returns: ReturnWorkflow::new(store.clone()),
            store,
        }
    }
}

/// Default wiring: the in-memory store.
///
/// `DATABASE_URL` switches to Postgres when the `postgres` feature is
/// compiled in.
pub async fn build_services() -> AppServices {
    #[cfg(feature = "postgres")]
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .expect("failed to connect to DATABASE_URL");
        let store = canopy_infra::store::PostgresStockStore::new(pool);
        store.migrate().await.expect("failed to run migrations");
        return AppServices::new(Arc::new(store));
    }

    AppServices::new(Arc::new(InMemoryStockStore::new()))
}
