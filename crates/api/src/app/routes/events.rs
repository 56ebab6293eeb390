use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use canopy_bookings::{Booking, DispatchLine};
use canopy_core::BookingId;
use canopy_infra::store::WriteBatch;
use canopy_infra::workflows::FulfillmentError;
use canopy_parties::Client;

use crate::app::routes::inventory::store_error_to_response;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/events", post(create_event))
        .route("/events/:id", get(get_event))
        .route("/events/:id/confirm", post(confirm_event))
        .route("/events/:id/selections", post(add_selections))
        .route("/events/:id/dispatch", post(dispatch_event))
        .route("/events/:id/return", post(return_event))
        .route("/events/:id/last-return-summary", get(get_last_return_summary))
        .route("/events/:id/audit", get(get_audit))
}

fn parse_id(id: &str) -> Result<BookingId, axum::response::Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid event id")
    })
}

async fn load_client(services: &AppServices, booking: &Booking) -> Option<Client> {
    services
        .store
        .client(booking.client_id())
        .await
        .ok()
        .flatten()
        .map(|c| c.doc)
}

pub async fn create_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateEventRequest>,
) -> axum::response::Response {
    let client = match services.store.client(body.client_id).await {
        Ok(Some(c)) => c.doc,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "client not found");
        }
        Err(e) => return store_error_to_response(e),
    };

    let booking = Booking::new(BookingId::new(), body.client_id, Utc::now());
    let json = dto::booking_to_json(&booking, Some(&client));
    if let Err(e) = services.store.insert_booking(booking).await {
        return store_error_to_response(e);
    }
    (StatusCode::CREATED, Json(json)).into_response()
}

pub async fn get_event(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    match services.store.booking(id).await {
        Ok(Some(booking)) => {
            let client = load_client(&services, &booking.doc).await;
            (
                StatusCode::OK,
                Json(dto::booking_to_json(&booking.doc, client.as_ref())),
            )
                .into_response()
        }
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "event not found"),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn confirm_event(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    let mut booking = match services.store.booking(id).await {
        Ok(Some(b)) => b,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "event not found");
        }
        Err(e) => return store_error_to_response(e),
    };

    if let Err(e) = booking.doc.confirm() {
        return errors::fulfillment_error_to_response(FulfillmentError::from(e));
    }

    let json_booking = booking.doc.clone();
    if let Err(e) = services
        .store
        .commit(WriteBatch {
            bookings: vec![booking],
            ..Default::default()
        })
        .await
    {
        return store_error_to_response(e);
    }

    let client = load_client(&services, &json_booking).await;
    (
        StatusCode::OK,
        Json(dto::booking_to_json(&json_booking, client.as_ref())),
    )
        .into_response()
}

pub async fn add_selections(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SelectionsBody>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };
    if body.items.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_quantity",
            "at least one line is required",
        );
    }

    let mut booking = match services.store.booking(id).await {
        Ok(Some(b)) => b,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "event not found");
        }
        Err(e) => return store_error_to_response(e),
    };

    for item in &body.items {
        if item.qty <= 0 {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_quantity",
                format!("quantity for product {} must be positive", item.product_id),
            );
        }
        let product = match services.store.product(item.product_id).await {
            Ok(Some(p)) => p.doc,
            Ok(None) => {
                return errors::json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("product {}", item.product_id),
                );
            }
            Err(e) => return store_error_to_response(e),
        };

        let rate = item.rate.unwrap_or(product.rate);
        let line = DispatchLine::new(
            item.product_id,
            product.name.clone(),
            product.unit.clone(),
            item.qty,
            rate,
            product.owned_qty,
            Vec::new(),
        );
        if let Err(e) = booking.doc.add_selection(line) {
            return errors::fulfillment_error_to_response(FulfillmentError::from(e));
        }
    }

    let json_booking = booking.doc.clone();
    if let Err(e) = services
        .store
        .commit(WriteBatch {
            bookings: vec![booking],
            ..Default::default()
        })
        .await
    {
        return store_error_to_response(e);
    }

    let client = load_client(&services, &json_booking).await;
    (
        StatusCode::OK,
        Json(dto::booking_to_json(&json_booking, client.as_ref())),
    )
        .into_response()
}

pub async fn dispatch_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Query(query): Query<dto::DispatchQuery>,
    Json(body): Json<dto::DispatchBody>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    let request = body.into_request(query.dry_run);
    let outcome = match services.dispatch.dispatch(id, request, actor.actor()).await {
        Ok(o) => o,
        Err(e) => return errors::fulfillment_error_to_response(e),
    };

    let client = load_client(&services, &outcome.booking).await;
    (
        StatusCode::OK,
        Json(dto::booking_to_json(&outcome.booking, client.as_ref())),
    )
        .into_response()
}

pub async fn return_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReturnBody>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    let outcome = match services
        .returns
        .process(id, body.into_request(), actor.actor())
        .await
    {
        Ok(o) => o,
        Err(e) => return errors::fulfillment_error_to_response(e),
    };

    let client = load_client(&services, &outcome.booking).await;
    (
        StatusCode::OK,
        Json(dto::return_outcome_to_json(&outcome, client.as_ref())),
    )
        .into_response()
}

/// The cached dues figure the invoicing side reads to prefill charges.
pub async fn get_last_return_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    match services.store.booking(id).await {
        Ok(Some(booking)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "eventId": booking.doc.id_typed().to_string(),
                "clientId": booking.doc.client_id().to_string(),
                "lastReturnSummary": booking.doc.last_return_summary().map(|s| {
                    serde_json::json!({
                        "totals": {
                            "shortage": s.totals.shortage,
                            "damage": s.totals.damage,
                            "late": s.totals.late,
                            "returnDue": s.totals.return_due,
                        },
                        "at": s.at,
                    })
                }),
            })),
        )
            .into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "event not found"),
        Err(e) => store_error_to_response(e),
    }
}

pub async fn get_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(r) => return r,
    };

    match services.store.audit_for("booking", &id.to_string()).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(
                entries
                    .iter()
                    .map(dto::audit_entry_to_json)
                    .collect::<Vec<_>>(),
            ),
        )
            .into_response(),
        Err(e) => store_error_to_response(e),
    }
}
