//! Domain events handed to the external notification collaborator.
//!
//! Events are emitted after a transition is committed. The engine never
//! waits on their delivery.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::money::CurrencyCode;
use super::payment::PaymentType;
use super::reservation::{ReservationId, ReservationStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    DepositAuthorizationRequested {
        reservation_id: ReservationId,
        amount: Decimal,
        currency: CurrencyCode,
        /// True when only the card is saved because the rental starts after
        /// the hold window.
        card_only: bool,
    },
    DepositAuthorized {
        reservation_id: ReservationId,
        amount: Decimal,
        currency: CurrencyCode,
        expires_at: Option<DateTime<Utc>>,
    },
    DepositCaptured {
        reservation_id: ReservationId,
        amount: Decimal,
        currency: CurrencyCode,
    },
    DepositReleased {
        reservation_id: ReservationId,
    },
    DepositFailed {
        reservation_id: ReservationId,
        reason: String,
    },
    DepositReturned {
        reservation_id: ReservationId,
        amount: Decimal,
        currency: CurrencyCode,
    },
    RentalPaid {
        reservation_id: ReservationId,
        payment_type: PaymentType,
        amount: Decimal,
        currency: CurrencyCode,
    },
    ReservationStatusChanged {
        reservation_id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },
}

impl DomainEvent {
    /// Dotted event name used by the notifier for routing.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::DepositAuthorizationRequested { .. } => "deposit.authorization_requested",
            DomainEvent::DepositAuthorized { .. } => "deposit.authorized",
            DomainEvent::DepositCaptured { .. } => "deposit.captured",
            DomainEvent::DepositReleased { .. } => "deposit.released",
            DomainEvent::DepositFailed { .. } => "deposit.failed",
            DomainEvent::DepositReturned { .. } => "deposit.returned",
            DomainEvent::RentalPaid { .. } => "payment.rental_paid",
            DomainEvent::ReservationStatusChanged { .. } => "reservation.status_changed",
        }
    }

    pub fn reservation_id(&self) -> ReservationId {
        match self {
            DomainEvent::DepositAuthorizationRequested { reservation_id, .. }
            | DomainEvent::DepositAuthorized { reservation_id, .. }
            | DomainEvent::DepositCaptured { reservation_id, .. }
            | DomainEvent::DepositReleased { reservation_id }
            | DomainEvent::DepositFailed { reservation_id, .. }
            | DomainEvent::DepositReturned { reservation_id, .. }
            | DomainEvent::RentalPaid { reservation_id, .. }
            | DomainEvent::ReservationStatusChanged { reservation_id, .. } => *reservation_id,
        }
    }
}
