//! Append-only audit trail.
//!
//! One entry is written per successful reserve/dispatch/return, inside the
//! same commit as the state change it records: an entry can never exist for
//! an aborted attempt, and a committed change can never lack its entry. No
//! update or delete operations exist anywhere in this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use canopy_core::ActorId;

/// The fulfillment actions that leave an audit trail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Reserve,
    Dispatch,
    Return,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Reserve => "reserve",
            AuditAction::Dispatch => "dispatch",
            AuditAction::Return => "return",
        }
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: Option<ActorId>,
    /// Free-form snapshot of what happened (lines, totals, flags).
    pub meta: JsonValue,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        actor: Option<ActorId>,
        meta: JsonValue,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            actor,
            meta,
            at,
        }
    }
}
