use serde::Deserialize;
use serde_json::{Value, json};

use canopy_bookings::{Booking, DispatchLine, DispatchRecord, ReturnRecord};
use canopy_core::{ClientId, ProductId};
use canopy_infra::audit::AuditEntry;
use canopy_infra::workflows::{
    DispatchRequest, RequestedLine, ReturnLineRequest, ReturnOutcome, ReturnRequest,
};
use canopy_parties::Client;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub unit: String,
    pub rate: u64,
    pub buy_price: Option<u64>,
    #[serde(default)]
    pub owned_qty: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub product_id: Option<ProductId>,
    pub item_name: String,
    pub supplier: String,
    pub unit_price: u64,
    pub available_qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct SetLeadPriorityRequest {
    pub priority: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub client_id: ClientId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchItem {
    pub product_id: ProductId,
    pub qty: i64,
    pub rate: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchBody {
    pub items: Vec<DispatchItem>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchQuery {
    pub dry_run: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionsBody {
    pub items: Vec<DispatchItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    pub product_id: ProductId,
    pub expected: i64,
    pub returned: i64,
    pub shortage: Option<i64>,
    #[serde(default)]
    pub damage_amount: u64,
    #[serde(default)]
    pub late_fee: u64,
    pub loss_price: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBody {
    pub items: Vec<ReturnItem>,
    pub return_due: Option<u64>,
}

impl DispatchBody {
    pub fn into_request(self, dry_run_flag: Option<bool>) -> DispatchRequest {
        DispatchRequest {
            lines: self
                .items
                .into_iter()
                .map(|i| RequestedLine {
                    product_id: i.product_id,
                    qty: i.qty,
                    rate: i.rate,
                })
                .collect(),
            dry_run: dry_run_flag.unwrap_or(self.dry_run),
        }
    }
}

impl ReturnBody {
    pub fn into_request(self) -> ReturnRequest {
        ReturnRequest {
            lines: self
                .items
                .into_iter()
                .map(|i| ReturnLineRequest {
                    product_id: i.product_id,
                    expected: i.expected,
                    returned: i.returned,
                    shortage: i.shortage,
                    damage: i.damage_amount,
                    late_fee: i.late_fee,
                    loss_price: i.loss_price,
                })
                .collect(),
            return_due: self.return_due,
        }
    }
}

// -------------------------
// Response mapping
// -------------------------

fn line_to_json(line: &DispatchLine) -> Value {
    json!({
        "productId": line.product_id.to_string(),
        "name": line.name,
        "unit": line.unit,
        "qty": line.qty,
        "rate": line.rate,
        "amount": line.amount,
        "ownedAfter": line.owned_after,
        "returnedQty": line.returned_qty,
        "completed": line.completed,
        "completedAt": line.completed_at,
        "borrowedUsages": line
            .borrowed_usages
            .iter()
            .map(|u| json!({
                "poolId": u.pool_id.to_string(),
                "supplier": u.supplier,
                "unitPrice": u.unit_price,
                "quantity": u.quantity,
            }))
            .collect::<Vec<_>>(),
    })
}

fn dispatch_record_to_json(record: &DispatchRecord) -> Value {
    json!({
        "id": record.id.to_string(),
        "lines": record.lines.iter().map(line_to_json).collect::<Vec<_>>(),
        "total": record.total,
        "at": record.at,
    })
}

fn return_record_to_json(record: &ReturnRecord) -> Value {
    json!({
        "lines": record
            .lines
            .iter()
            .map(|l| json!({
                "productId": l.product_id.to_string(),
                "dispatchedQty": l.dispatched_qty,
                "returnedQty": l.returned_qty,
                "shortage": l.shortage,
                "damage": l.damage,
                "lateFee": l.late_fee,
                "lossPrice": l.loss_price,
                "shortageCost": l.shortage_cost,
                "lineAdjust": l.line_adjust,
            }))
            .collect::<Vec<_>>(),
        "totals": {
            "shortageCost": record.totals.shortage_cost,
            "damage": record.totals.damage,
            "late": record.totals.late,
        },
        "at": record.at,
    })
}

pub fn booking_to_json(booking: &Booking, client: Option<&Client>) -> Value {
    json!({
        "id": booking.id_typed().to_string(),
        "clientId": booking.client_id().to_string(),
        "client": client.map(client_to_json),
        "status": booking.status().as_str(),
        "selections": booking.selections().iter().map(line_to_json).collect::<Vec<_>>(),
        "dispatchDrafts": booking
            .dispatch_drafts()
            .iter()
            .map(dispatch_record_to_json)
            .collect::<Vec<_>>(),
        "dispatches": booking
            .dispatches()
            .iter()
            .map(dispatch_record_to_json)
            .collect::<Vec<_>>(),
        "activeDispatchId": booking.active_dispatch().map(|id| id.to_string()),
        "returns": booking.returns().iter().map(return_record_to_json).collect::<Vec<_>>(),
        "returnClosed": booking.return_closed(),
        "lastReturnSummary": booking.last_return_summary().map(|s| json!({
            "totals": {
                "shortage": s.totals.shortage,
                "damage": s.totals.damage,
                "late": s.totals.late,
                "returnDue": s.totals.return_due,
            },
            "at": s.at,
        })),
        "createdAt": booking.created_at(),
    })
}

pub fn client_to_json(client: &Client) -> Value {
    json!({
        "id": client.id.to_string(),
        "name": client.name,
        "phone": client.phone,
    })
}

pub fn product_to_json(product: &canopy_inventory::Product) -> Value {
    json!({
        "id": product.id.to_string(),
        "name": product.name,
        "unit": product.unit,
        "rate": product.rate,
        "buyPrice": product.buy_price,
        "ownedQty": product.owned_qty,
    })
}

pub fn pool_to_json(pool: &canopy_inventory::BorrowedPool) -> Value {
    json!({
        "id": pool.id.to_string(),
        "productId": pool.product_id.map(|id: ProductId| id.to_string()),
        "itemName": pool.item_name,
        "supplier": pool.supplier,
        "unitPrice": pool.unit_price,
        "availableQty": pool.available_qty,
        "lastUsedAt": pool.last_used_at,
        "createdAt": pool.created_at,
    })
}

pub fn audit_entry_to_json(entry: &AuditEntry) -> Value {
    json!({
        "id": entry.id.to_string(),
        "action": entry.action.as_str(),
        "entityType": entry.entity_type,
        "entityId": entry.entity_id,
        "actorId": entry.actor.map(|a| a.to_string()),
        "meta": entry.meta,
        "at": entry.at,
    })
}

pub fn return_outcome_to_json(outcome: &ReturnOutcome, client: Option<&Client>) -> Value {
    json!({
        "event": booking_to_json(&outcome.booking, client),
        "summary": {
            "totalShortageCost": outcome.totals.shortage_cost,
            "totalDamage": outcome.totals.damage,
            "totalLate": outcome.totals.late,
            "lines": outcome
                .lines
                .iter()
                .map(|l| json!({
                    "productId": l.line.product_id.to_string(),
                    "dispatchedQty": l.line.dispatched_qty,
                    "returnedQty": l.line.returned_qty,
                    "shortage": l.line.shortage,
                    "damage": l.line.damage,
                    "lateFee": l.line.late_fee,
                    "lossPrice": l.line.loss_price,
                    "shortageCost": l.line.shortage_cost,
                    "lineAdjust": l.line.line_adjust,
                    "completed": l.completed,
                }))
                .collect::<Vec<_>>(),
            "allCompleted": outcome.all_completed,
        },
        "returnDue": outcome.return_due,
        "clientId": outcome.client_id.to_string(),
        "eventId": outcome.booking.id_typed().to_string(),
    })
}
