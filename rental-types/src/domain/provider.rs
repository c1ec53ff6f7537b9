//! Provider-neutral views of payment-provider objects and webhook events.
//!
//! The gateway adapter parses the provider's wire format into these types,
//! so nothing above it ever sees provider-specific payloads or error codes.
//! Amounts here are integer minor units, exactly as the provider reports them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::CurrencyCode;
use super::payment::PaymentType;
use super::reservation::ReservationId;

/// Metadata keys the engine attaches to provider objects.
pub mod metadata {
    pub const RESERVATION_ID: &str = "reservation_id";
    pub const RESERVATION_NUMBER: &str = "reservation_number";
    /// `deposit` for deposit holds, otherwise the [`PaymentType`](super::PaymentType) paid.
    pub const PURPOSE: &str = "purpose";
    pub const DEPOSIT_PURPOSE: &str = "deposit";
}

pub type Metadata = HashMap<String, String>;

fn reservation_from(metadata: &Metadata) -> Option<ReservationId> {
    metadata
        .get(metadata::RESERVATION_ID)
        .and_then(|id| id.parse().ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

/// A (manual-capture) payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub amount_capturable: i64,
    pub amount_received: i64,
    pub currency: CurrencyCode,
    pub client_secret: Option<String>,
    pub payment_method: Option<String>,
    pub latest_charge: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Human-readable reason of the last failed attempt.
    pub last_error: Option<String>,
    pub created: DateTime<Utc>,
    pub metadata: Metadata,
}

impl PaymentIntent {
    pub fn reservation_id(&self) -> Option<ReservationId> {
        reservation_from(&self.metadata)
    }

    pub fn is_deposit(&self) -> bool {
        self.metadata.get(metadata::PURPOSE).map(String::as_str) == Some(metadata::DEPOSIT_PURPOSE)
    }
}

/// A card-saving setup intent (no funds held).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub payment_method: Option<String>,
    pub last_error: Option<String>,
    pub metadata: Metadata,
}

impl SetupIntent {
    pub fn reservation_id(&self) -> Option<ReservationId> {
        reservation_from(&self.metadata)
    }
}

/// A hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub currency: Option<CurrencyCode>,
    pub payment_intent: Option<String>,
    /// Card retained for future off-session use, when the adapter could resolve it.
    pub payment_method: Option<String>,
    /// Provider customer created for the session, if any.
    pub customer: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Metadata,
}

impl CheckoutSession {
    pub fn reservation_id(&self) -> Option<ReservationId> {
        reservation_from(&self.metadata)
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Ledger type the session pays for; rental unless tagged otherwise.
    pub fn payment_type(&self) -> PaymentType {
        self.metadata
            .get(metadata::PURPOSE)
            .and_then(|p| p.parse().ok())
            .unwrap_or(PaymentType::Rental)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: String,
    pub charge: Option<String>,
}

/// Onboarding state of a store's sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccountStatus {
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub country: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRefunded {
    pub charge_id: String,
    pub payment_intent: Option<String>,
    pub amount_refunded: i64,
    /// True when the whole charge was refunded.
    pub fully_refunded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutSessionEvent {
    Completed(CheckoutSession),
    AsyncPaymentSucceeded(CheckoutSession),
    AsyncPaymentFailed(CheckoutSession),
    Expired(CheckoutSession),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentIntentEvent {
    /// The hold was placed; funds are capturable.
    AmountCapturableUpdated(PaymentIntent),
    Succeeded(PaymentIntent),
    Canceled(PaymentIntent),
    PaymentFailed(PaymentIntent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupIntentEvent {
    Succeeded(SetupIntent),
    SetupFailed(SetupIntent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    Updated(SubAccountStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeEvent {
    Refunded(ChargeRefunded),
}

/// Closed union of the provider events the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEventKind {
    CheckoutSession(CheckoutSessionEvent),
    PaymentIntent(PaymentIntentEvent),
    SetupIntent(SetupIntentEvent),
    Account(AccountEvent),
    Charge(ChargeEvent),
    /// Anything else; logged and acknowledged.
    Unknown(String),
}

/// A verified webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Provider event id; the dedup key for redeliveries.
    pub id: String,
    pub event_type: String,
    pub created: DateTime<Utc>,
    /// Sub-account the event originated from, if any.
    pub account: Option<String>,
    pub kind: ProviderEventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_session_payment_type_defaults_to_rental() {
        let mut session = CheckoutSession {
            id: "cs_1".into(),
            url: None,
            payment_status: "paid".into(),
            amount_total: Some(20000),
            currency: Some(CurrencyCode::new("EUR").unwrap()),
            payment_intent: None,
            payment_method: None,
            customer: None,
            expires_at: None,
            metadata: Metadata::new(),
        };
        assert_eq!(session.payment_type(), PaymentType::Rental);
        assert!(session.reservation_id().is_none());

        let id = ReservationId::new();
        session
            .metadata
            .insert(metadata::RESERVATION_ID.into(), id.to_string());
        session
            .metadata
            .insert(metadata::PURPOSE.into(), "damage".into());
        assert_eq!(session.payment_type(), PaymentType::Damage);
        assert_eq!(session.reservation_id(), Some(id));
    }
}
