use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
};

use canopy_core::ClientId;
use canopy_parties::{Client, LeadPriority};

use crate::app::routes::inventory::store_error_to_response;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/clients", post(create_client))
        .route("/leads/:phone", put(set_lead_priority))
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateClientRequest>,
) -> axum::response::Response {
    let client = match Client::new(ClientId::new(), body.name, body.phone) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let json = dto::client_to_json(&client);
    if let Err(e) = services.store.insert_client(client).await {
        return store_error_to_response(e);
    }
    (StatusCode::CREATED, Json(json)).into_response()
}

pub async fn set_lead_priority(
    Extension(services): Extension<Arc<AppServices>>,
    Path(phone): Path<String>,
    Json(body): Json<dto::SetLeadPriorityRequest>,
) -> axum::response::Response {
    let priority: LeadPriority = match body.priority.parse() {
        Ok(p) => p,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_priority",
                "priority must be one of: hot, warm, cold",
            );
        }
    };

    if let Err(e) = services.store.set_lead_priority(&phone, priority).await {
        return store_error_to_response(e);
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "phone": phone,
            "priority": priority.as_str(),
        })),
    )
        .into_response()
}
