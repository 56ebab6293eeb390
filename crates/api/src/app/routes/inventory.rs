use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use canopy_core::{PoolId, ProductId};
use canopy_inventory::{BorrowedPool, Product};
use canopy_infra::store::StoreError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", get(get_product))
        .route("/pools", post(create_pool))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let product = match Product::new(
        ProductId::new(),
        body.name,
        body.unit,
        body.rate,
        body.buy_price,
        body.owned_qty,
    ) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let json = dto::product_to_json(&product);
    if let Err(e) = services.store.insert_product(product).await {
        return store_error_to_response(e);
    }
    (StatusCode::CREATED, Json(json)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id");
        }
    };

    match services.store.product(id).await {
        Ok(Some(product)) => {
            (StatusCode::OK, Json(dto::product_to_json(&product.doc))).into_response()
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn create_pool(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreatePoolRequest>,
) -> axum::response::Response {
    let pool = match BorrowedPool::new(
        PoolId::new(),
        body.product_id,
        body.item_name,
        body.supplier,
        body.unit_price,
        body.available_qty,
        Utc::now(),
    ) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let json = dto::pool_to_json(&pool);
    if let Err(e) = services.store.insert_pool(pool).await {
        return store_error_to_response(e);
    }
    (StatusCode::CREATED, Json(json)).into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Duplicate(msg) => errors::json_error(StatusCode::CONFLICT, "duplicate", msg),
        StoreError::Conflict(msg) => errors::json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Backend(msg) => {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}
