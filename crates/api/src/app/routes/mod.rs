use axum::Router;

pub mod clients;
pub mod events;
pub mod inventory;
pub mod system;

/// Router for all domain endpoints.
pub fn router() -> Router {
    Router::new()
        .merge(inventory::router())
        .merge(clients::router())
        .merge(events::router())
}
