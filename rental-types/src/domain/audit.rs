//! Audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::reservation::ReservationId;

/// One line of a reservation's audit log.
///
/// Lifecycle transitions, acknowledged warnings, deposit side effects and
/// ignored provider events all land here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub reservation_id: ReservationId,
    /// `staff`, `webhook`, `sweeper` or a staff identifier.
    pub actor: String,
    #[schema(example = "reservation.pickup")]
    pub action: String,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        reservation_id: ReservationId,
        actor: impl Into<String>,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            reservation_id,
            actor: actor.into(),
            action: action.into(),
            detail,
            created_at: Utc::now(),
        }
    }
}
