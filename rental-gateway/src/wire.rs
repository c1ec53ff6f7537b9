//! Provider JSON shapes and their translation into port types.

use chrono::{DateTime, TimeZone, Utc};
use rental_types::GatewayError;
use rental_types::domain::provider::Metadata;
use rental_types::domain::{
    AccountEvent, ChargeEvent, ChargeRefunded, CheckoutSession, CheckoutSessionEvent,
    CurrencyCode, IntentStatus, PaymentIntent, PaymentIntentEvent, ProviderEvent,
    ProviderEventKind, Refund, SetupIntent, SetupIntentEvent, SubAccountStatus,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// A field the provider returns either as an id or as the expanded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Expandable<T> {
    Id(String),
    Object(Box<T>),
}

/// Provider objects addressable by id.
pub(crate) trait WireObject {
    fn id(&self) -> &str;
}

impl<T: WireObject> Expandable<T> {
    fn id(&self) -> &str {
        match self {
            Expandable::Id(id) => id,
            Expandable::Object(obj) => obj.id(),
        }
    }
}

/// Expanded object of which only the id matters.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRef {
    pub id: String,
}

impl WireObject for WireRef {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireError {
    pub message: Option<String>,
    pub code: Option<String>,
    pub decline_code: Option<String>,
}

/// Body of a non-2xx response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireErrorBody {
    pub error: WireError,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WirePaymentIntent {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_capturable: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub payment_method: Option<Expandable<WireRef>>,
    pub latest_charge: Option<Expandable<WireRef>>,
    pub cancellation_reason: Option<String>,
    pub last_payment_error: Option<WireError>,
    pub created: i64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl WireObject for WirePaymentIntent {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireSetupIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub payment_method: Option<Expandable<WireRef>>,
    pub last_setup_error: Option<WireError>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_intent: Option<Expandable<WirePaymentIntent>>,
    pub customer: Option<Expandable<WireRef>>,
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRefund {
    pub id: String,
    pub amount: i64,
    pub status: Option<String>,
    pub charge: Option<Expandable<WireRef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireAccount {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    pub country: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireCharge {
    pub id: String,
    pub payment_intent: Option<Expandable<WireRef>>,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub refunded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireAccountLink {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct WireEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    account: Option<String>,
    data: WireEventData,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, GatewayError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| GatewayError::InvalidPayload(format!("Invalid timestamp: {secs}")))
}

fn currency(code: &str) -> Result<CurrencyCode, GatewayError> {
    CurrencyCode::new(code).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
}

fn intent_status(status: &str) -> Result<IntentStatus, GatewayError> {
    Ok(match status {
        "requires_payment_method" => IntentStatus::RequiresPaymentMethod,
        "requires_confirmation" => IntentStatus::RequiresConfirmation,
        "requires_action" => IntentStatus::RequiresAction,
        "processing" => IntentStatus::Processing,
        "requires_capture" => IntentStatus::RequiresCapture,
        "canceled" => IntentStatus::Canceled,
        "succeeded" => IntentStatus::Succeeded,
        other => {
            return Err(GatewayError::InvalidPayload(format!(
                "Unknown intent status: {other}"
            )));
        }
    })
}

fn error_message(error: Option<WireError>) -> Option<String> {
    error.map(|e| {
        e.message
            .or(e.decline_code)
            .or(e.code)
            .unwrap_or_else(|| "unknown error".into())
    })
}

impl TryFrom<WirePaymentIntent> for PaymentIntent {
    type Error = GatewayError;

    fn try_from(w: WirePaymentIntent) -> Result<Self, Self::Error> {
        Ok(PaymentIntent {
            id: w.id,
            status: intent_status(&w.status)?,
            amount: w.amount,
            amount_capturable: w.amount_capturable,
            amount_received: w.amount_received,
            currency: currency(&w.currency)?,
            client_secret: w.client_secret,
            payment_method: w.payment_method.map(|pm| pm.id().to_string()),
            latest_charge: w.latest_charge.map(|c| c.id().to_string()),
            cancellation_reason: w.cancellation_reason,
            last_error: error_message(w.last_payment_error),
            created: timestamp(w.created)?,
            metadata: w.metadata,
        })
    }
}

impl From<WireSetupIntent> for SetupIntent {
    fn from(w: WireSetupIntent) -> Self {
        SetupIntent {
            id: w.id,
            client_secret: w.client_secret,
            payment_method: w.payment_method.map(|pm| pm.id().to_string()),
            last_error: error_message(w.last_setup_error),
            metadata: w.metadata,
        }
    }
}

impl TryFrom<WireCheckoutSession> for CheckoutSession {
    type Error = GatewayError;

    fn try_from(w: WireCheckoutSession) -> Result<Self, Self::Error> {
        let (payment_intent, payment_method) = match w.payment_intent {
            Some(Expandable::Id(id)) => (Some(id), None),
            Some(Expandable::Object(pi)) => (
                Some(pi.id.clone()),
                pi.payment_method.as_ref().map(|pm| pm.id().to_string()),
            ),
            None => (None, None),
        };
        Ok(CheckoutSession {
            id: w.id,
            url: w.url,
            payment_status: w.payment_status,
            amount_total: w.amount_total,
            currency: w.currency.as_deref().map(currency).transpose()?,
            payment_intent,
            payment_method,
            customer: w.customer.map(|c| c.id().to_string()),
            expires_at: w.expires_at.map(timestamp).transpose()?,
            metadata: w.metadata,
        })
    }
}

impl From<WireRefund> for Refund {
    fn from(w: WireRefund) -> Self {
        Refund {
            id: w.id,
            amount: w.amount,
            status: w.status.unwrap_or_else(|| "pending".into()),
            charge: w.charge.map(|c| c.id().to_string()),
        }
    }
}

impl From<WireAccount> for SubAccountStatus {
    fn from(w: WireAccount) -> Self {
        SubAccountStatus {
            account_id: w.id,
            charges_enabled: w.charges_enabled,
            payouts_enabled: w.payouts_enabled,
            details_submitted: w.details_submitted,
            country: w.country,
            email: w.email,
        }
    }
}

impl From<WireCharge> for ChargeRefunded {
    fn from(w: WireCharge) -> Self {
        ChargeRefunded {
            charge_id: w.id,
            payment_intent: w.payment_intent.map(|pi| pi.id().to_string()),
            amount_refunded: w.amount_refunded,
            fully_refunded: w.refunded,
        }
    }
}

fn object<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidPayload(e.to_string()))
}

fn session(value: serde_json::Value) -> Result<CheckoutSession, GatewayError> {
    object::<WireCheckoutSession>(value)?.try_into()
}

fn intent(value: serde_json::Value) -> Result<PaymentIntent, GatewayError> {
    object::<WirePaymentIntent>(value)?.try_into()
}

fn setup(value: serde_json::Value) -> Result<SetupIntent, GatewayError> {
    Ok(object::<WireSetupIntent>(value)?.into())
}

/// Parses a (verified) webhook body into a [`ProviderEvent`].
///
/// Event types outside the handled set become [`ProviderEventKind::Unknown`].
pub fn parse_event(payload: &[u8]) -> Result<ProviderEvent, GatewayError> {
    let wire: WireEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
    let obj = wire.data.object;

    let kind = match wire.event_type.as_str() {
        "checkout.session.completed" => {
            ProviderEventKind::CheckoutSession(CheckoutSessionEvent::Completed(session(obj)?))
        }
        "checkout.session.async_payment_succeeded" => ProviderEventKind::CheckoutSession(
            CheckoutSessionEvent::AsyncPaymentSucceeded(session(obj)?),
        ),
        "checkout.session.async_payment_failed" => ProviderEventKind::CheckoutSession(
            CheckoutSessionEvent::AsyncPaymentFailed(session(obj)?),
        ),
        "checkout.session.expired" => {
            ProviderEventKind::CheckoutSession(CheckoutSessionEvent::Expired(session(obj)?))
        }
        "payment_intent.amount_capturable_updated" => ProviderEventKind::PaymentIntent(
            PaymentIntentEvent::AmountCapturableUpdated(intent(obj)?),
        ),
        "payment_intent.succeeded" => {
            ProviderEventKind::PaymentIntent(PaymentIntentEvent::Succeeded(intent(obj)?))
        }
        "payment_intent.canceled" => {
            ProviderEventKind::PaymentIntent(PaymentIntentEvent::Canceled(intent(obj)?))
        }
        "payment_intent.payment_failed" => {
            ProviderEventKind::PaymentIntent(PaymentIntentEvent::PaymentFailed(intent(obj)?))
        }
        "setup_intent.succeeded" => {
            ProviderEventKind::SetupIntent(SetupIntentEvent::Succeeded(setup(obj)?))
        }
        "setup_intent.setup_failed" => {
            ProviderEventKind::SetupIntent(SetupIntentEvent::SetupFailed(setup(obj)?))
        }
        "account.updated" => ProviderEventKind::Account(AccountEvent::Updated(
            object::<WireAccount>(obj)?.into(),
        )),
        "charge.refunded" => ProviderEventKind::Charge(ChargeEvent::Refunded(
            object::<WireCharge>(obj)?.into(),
        )),
        other => ProviderEventKind::Unknown(other.to_string()),
    };

    Ok(ProviderEvent {
        id: wire.id,
        event_type: wire.event_type,
        created: timestamp(wire.created)?,
        account: wire.account,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_740_830_400,
            "account": "acct_store",
            "data": { "object": object }
        }))
        .unwrap()
    }

    fn intent_json(status: &str) -> serde_json::Value {
        json!({
            "id": "pi_1",
            "object": "payment_intent",
            "status": status,
            "amount": 10000,
            "amount_capturable": 10000,
            "amount_received": 0,
            "currency": "eur",
            "client_secret": "pi_1_secret_x",
            "payment_method": "pm_card",
            "latest_charge": { "id": "ch_1", "object": "charge" },
            "cancellation_reason": null,
            "last_payment_error": null,
            "created": 1_740_830_000,
            "metadata": { "reservation_id": "7b0f7b5e-1a64-4c8a-9b0a-0d9d0b1c2e3f", "purpose": "deposit" }
        })
    }

    #[test]
    fn test_parses_capturable_intent_event() {
        let parsed = parse_event(&event(
            "payment_intent.amount_capturable_updated",
            intent_json("requires_capture"),
        ))
        .unwrap();

        assert_eq!(parsed.id, "evt_1");
        assert_eq!(parsed.account.as_deref(), Some("acct_store"));
        let ProviderEventKind::PaymentIntent(PaymentIntentEvent::AmountCapturableUpdated(pi)) =
            parsed.kind
        else {
            panic!("unexpected kind");
        };
        assert_eq!(pi.status, IntentStatus::RequiresCapture);
        assert_eq!(pi.currency.as_str(), "EUR");
        assert_eq!(pi.latest_charge.as_deref(), Some("ch_1"));
        assert!(pi.is_deposit());
        assert!(pi.reservation_id().is_some());
    }

    #[test]
    fn test_session_with_expanded_intent_exposes_payment_method() {
        let mut pi = intent_json("succeeded");
        pi["payment_method"] = json!({ "id": "pm_saved", "object": "payment_method" });
        let parsed = parse_event(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "url": null,
                "payment_status": "paid",
                "amount_total": 20000,
                "currency": "eur",
                "payment_intent": pi,
                "customer": "cus_1",
                "expires_at": 1_740_832_000,
                "metadata": {}
            }),
        ))
        .unwrap();

        let ProviderEventKind::CheckoutSession(CheckoutSessionEvent::Completed(session)) =
            parsed.kind
        else {
            panic!("unexpected kind");
        };
        assert!(session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
        assert_eq!(session.payment_method.as_deref(), Some("pm_saved"));
        assert_eq!(session.customer.as_deref(), Some("cus_1"));
    }

    #[test]
    fn test_unknown_event_type_is_not_an_error() {
        let parsed = parse_event(&event("invoice.paid", json!({ "id": "in_1" }))).unwrap();
        assert_eq!(
            parsed.kind,
            ProviderEventKind::Unknown("invoice.paid".into())
        );
    }

    #[test]
    fn test_malformed_object_is_invalid_payload() {
        let result = parse_event(&event(
            "payment_intent.succeeded",
            json!({ "id": "pi_1", "status": "succeeded" }),
        ));
        assert!(matches!(result, Err(GatewayError::InvalidPayload(_))));
        assert!(matches!(
            parse_event(b"not json"),
            Err(GatewayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_charge_refunded_event() {
        let parsed = parse_event(&event(
            "charge.refunded",
            json!({ "id": "ch_1", "payment_intent": "pi_1", "amount_refunded": 6000, "refunded": false }),
        ))
        .unwrap();
        let ProviderEventKind::Charge(ChargeEvent::Refunded(charge)) = parsed.kind else {
            panic!("unexpected kind");
        };
        assert_eq!(charge.payment_intent.as_deref(), Some("pi_1"));
        assert!(!charge.fully_refunded);
    }
}
