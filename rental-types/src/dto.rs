//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    AuditEntry, DepositStatus, LedgerSummary, Payment, PaymentMethod, PaymentType, Reservation,
    ReservationAction, TransitionWarning,
};

// ─────────────────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────────────────

/// Successful response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Stable code for localized display
    #[schema(example = "INVALID_STATE")]
    pub error_code: String,
    pub error: String,
    /// Warnings to acknowledge, for `ACKNOWLEDGEMENT_REQUIRED`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<TransitionWarning>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reservation lifecycle DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to move a reservation along its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub action: ReservationAction,
    /// Proceed despite payment warnings (pickup and return only)
    #[serde(default)]
    pub acknowledge_warnings: bool,
    /// Staff member performing the action, for the audit trail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Money side effect performed while cancelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CancelSideEffect {
    /// Nothing held; nothing to do.
    None,
    /// The unconfirmed provider intent was cancelled.
    AuthorizationCancelled,
    /// The hold or saved card was released.
    DepositReleased,
    /// Funds were captured; staff must record a deposit return.
    DepositReturnRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionResponse {
    pub reservation: Reservation,
    /// Warnings that were acknowledged for this transition
    pub acknowledged_warnings: Vec<TransitionWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side_effect: Option<CancelSideEffect>,
}

/// Read-only preview of the handover warnings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WarningsResponse {
    pub warnings: Vec<TransitionWarning>,
    pub ledger: LedgerSummary,
    #[schema(value_type = String, example = "200.00")]
    pub rental_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub payments: Vec<Payment>,
    pub ledger: LedgerSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Checkout DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Which flow opened the checkout; decides the session lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutKind {
    /// Customer checkout at booking time (30 minutes).
    #[default]
    Initial,
    /// Payment link sent from the dashboard (24 hours).
    PaymentRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LineItemRequest {
    #[schema(example = "Kayak, 2 days")]
    pub name: String,
    #[serde(default = "default_quantity")]
    #[schema(example = 1)]
    pub quantity: u32,
    #[schema(value_type = String, example = "90.00")]
    pub unit_amount: Decimal,
}

fn default_quantity() -> u32 {
    1
}

/// Request to open a hosted checkout session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub kind: CheckoutKind,
    /// Explicit line items; the outstanding rental balance when empty
    #[serde(default)]
    pub line_items: Vec<LineItemRequest>,
    /// Explicit amount for a payment request, instead of the balance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    /// `rental` (default) or `damage`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<PaymentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Staff-recorded payment outside the provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationMode {
    /// Customer confirms with a client secret.
    #[default]
    Interactive,
    /// Confirm immediately with the saved payment method.
    OffSession,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeDepositRequest {
    #[serde(default)]
    pub mode: AuthorizationMode,
    /// Hold amount; the reservation's deposit when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeDepositResponse {
    pub deposit_status: DepositStatus,
    pub intent_id: Option<String>,
    /// For interactive confirmation by the customer
    pub client_secret: Option<String>,
    /// True when only the card is being saved (rental beyond the hold window)
    pub card_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CaptureDepositRequest {
    /// Amount to capture; the full hold when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "60.00")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnDepositRequest {
    #[schema(value_type = String, example = "60.00")]
    pub amount: Decimal,
    /// `gateway` refunds the captured charge; anything else is recorded only
    pub method: PaymentMethod,
}

// ─────────────────────────────────────────────────────────────────────────────
// Store DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectStoreRequest {
    #[schema(example = "owner@store.example")]
    pub email: String,
    #[schema(example = "FR")]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OnboardingLinkRequest {
    #[schema(example = "https://dashboard.example/stores/return")]
    pub return_url: String,
    #[schema(example = "https://dashboard.example/stores/refresh")]
    pub refresh_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OnboardingLinkResponse {
    pub url: String,
}
