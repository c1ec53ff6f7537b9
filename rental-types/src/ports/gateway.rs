//! Payment provider port.
//!
//! One gateway value talks to one account: the platform itself, or a single
//! store's sub-account. Every provider failure is translated into
//! [`GatewayError`] by the adapter.

use chrono::{DateTime, Utc};

use crate::domain::provider::Metadata;
use crate::domain::{
    CheckoutSession, CurrencyCode, PaymentIntent, ProviderEvent, Refund, SetupIntent,
    StoreAccount, SubAccountStatus,
};
use crate::error::DomainError;

/// Provider failures, already stripped of provider-specific codes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Network, timeout or provider-side infrastructure failure. Retryable,
    /// but the outcome of a mutating call is unknown.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (decline, invalid state). Not retried.
    #[error("Payment provider rejected the request: {message}")]
    Rejected {
        /// Stable decline category such as `card_declined`, when known.
        code: Option<String>,
        message: String,
    },

    #[error("Webhook signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Invalid provider payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

#[derive(Debug, Clone)]
pub struct CreateSubAccount {
    pub email: String,
    pub country: String,
}

#[derive(Debug, Clone)]
pub struct CreatePaymentIntent {
    /// Minor units.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub manual_capture: bool,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSetupIntent {
    pub customer: Option<String>,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutLineItem {
    pub name: String,
    pub quantity: u32,
    /// Minor units per item.
    pub unit_amount: i64,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutSession {
    pub line_items: Vec<CheckoutLineItem>,
    pub currency: CurrencyCode,
    pub expires_at: DateTime<Utc>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    /// Retain the payment method for later off-session charges.
    pub save_payment_method: bool,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    RequestedByCustomer,
    Duplicate,
    Fraudulent,
}

#[derive(Debug, Clone)]
pub struct CreateRefund {
    pub charge: String,
    /// Minor units; the full charge when absent.
    pub amount: Option<i64>,
    pub reason: RefundReason,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

/// Port trait for the card-payment provider.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Sub-accounts
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_sub_account(
        &self,
        req: CreateSubAccount,
    ) -> Result<SubAccountStatus, GatewayError>;

    /// Returns a hosted onboarding URL for the sub-account.
    async fn create_onboarding_link(
        &self,
        account_id: &str,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<String, GatewayError>;

    async fn get_sub_account_status(
        &self,
        account_id: &str,
    ) -> Result<SubAccountStatus, GatewayError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payment intents
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_payment_intent(
        &self,
        req: CreatePaymentIntent,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn confirm_payment_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
        off_session: bool,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_payment_intent(&self, intent_id: &str)
    -> Result<PaymentIntent, GatewayError>;

    /// Captures a held intent; `amount` (minor units) defaults to the full hold.
    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount: Option<i64>,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<PaymentIntent, GatewayError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Setup intents (card saving without a hold)
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_setup_intent(&self, req: CreateSetupIntent)
    -> Result<SetupIntent, GatewayError>;

    async fn retrieve_setup_intent(&self, setup_id: &str) -> Result<SetupIntent, GatewayError>;

    async fn cancel_setup_intent(&self, setup_id: &str) -> Result<SetupIntent, GatewayError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Checkout & refunds
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_checkout_session(
        &self,
        req: CreateCheckoutSession,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn create_refund(&self, req: CreateRefund) -> Result<Refund, GatewayError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Verifies a webhook signature and parses the event. Fails closed.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<ProviderEvent, GatewayError>;
}

/// Builds gateway clients bound to a specific account.
///
/// Replaces any process-wide "current connection": services ask for the
/// client of the store they are acting for.
pub trait GatewayFactory: Send + Sync + 'static {
    type Gateway: PaymentGateway;

    /// A client acting as the platform account.
    fn platform(&self) -> Self::Gateway;

    /// A client acting on behalf of the store's sub-account.
    fn for_store(&self, store: &StoreAccount) -> Result<Self::Gateway, DomainError>;
}
