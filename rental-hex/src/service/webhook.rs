//! Provider webhook intake.
//!
//! The provider delivers at least once and in any order. Every event is
//! verified, de-duplicated by its id, then routed to the manager that owns
//! the affected state. Errors worth a redelivery are returned to the caller
//! so the HTTP layer can answer with a retryable status.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use rental_types::domain::{
    AccountEvent, ChargeEvent, ChargeRefunded, PaymentStatus, PaymentType, ProviderEvent,
    ProviderEventKind,
};
use rental_types::{AppError, GatewayError, GatewayFactory, PaymentGateway, ReservationRepository};

use super::ServiceContext;
use super::checkout::CheckoutSessionManager;
use super::deposit::DepositAuthorizationManager;
use super::stores::StoreOnboarding;

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State changed.
    Processed,
    /// Already handled earlier.
    Duplicate,
    /// Understood but irrelevant to the current state.
    Ignored,
    /// Could not be handled and will never succeed; acknowledged anyway.
    Dropped,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Dropped => "dropped",
        }
    }
}

pub struct WebhookReconciler<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
    checkout: CheckoutSessionManager<R, G>,
    deposits: DepositAuthorizationManager<R, G>,
    stores: StoreOnboarding<R, G>,
}

impl<R, G> Clone for WebhookReconciler<R, G> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            checkout: self.checkout.clone(),
            deposits: self.deposits.clone(),
            stores: self.stores.clone(),
        }
    }
}

impl<R: ReservationRepository, G: GatewayFactory> WebhookReconciler<R, G> {
    pub(crate) fn new(ctx: Arc<ServiceContext<R, G>>) -> Self {
        Self {
            checkout: CheckoutSessionManager::new(ctx.clone()),
            deposits: DepositAuthorizationManager::new(ctx.clone()),
            stores: StoreOnboarding::new(ctx.clone()),
            ctx,
        }
    }

    /// Verifies and applies one raw delivery.
    ///
    /// Returns `Err` only for a bad signature or a retryable failure.
    pub async fn handle(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome, AppError> {
        let event = match self.ctx.gateways.platform().verify_webhook_signature(
            payload,
            signature,
            &self.ctx.settings.webhook_secret,
        ) {
            Ok(event) => event,
            Err(GatewayError::InvalidPayload(reason)) => {
                warn!(%reason, "Dropping unparseable webhook payload");
                return Ok(WebhookOutcome::Dropped);
            }
            Err(e) => {
                warn!(target: "security", error = %e, "Webhook signature rejected");
                return Err(AppError::SignatureInvalid);
            }
        };
        self.process(&event).await
    }

    /// Applies an already verified event.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process(&self, event: &ProviderEvent) -> Result<WebhookOutcome, AppError> {
        if self.ctx.repo.is_event_processed(&event.id).await? {
            info!("Duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match self.dispatch(event).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Webhook handling failed, awaiting redelivery");
                return Err(e);
            }
            Err(e) => {
                error!(error_code = e.code(), error = %e, "Dropping webhook that cannot be applied");
                WebhookOutcome::Dropped
            }
        };

        self.ctx
            .repo
            .mark_event_processed(&event.id, &event.event_type)
            .await?;
        info!(outcome = outcome.as_str(), "Webhook handled");
        Ok(outcome)
    }

    async fn dispatch(&self, event: &ProviderEvent) -> Result<WebhookOutcome, AppError> {
        match &event.kind {
            ProviderEventKind::CheckoutSession(e) => self.checkout.on_session_event(&event.id, e).await,
            ProviderEventKind::PaymentIntent(e) => {
                self.deposits
                    .on_payment_intent_event(&event.id, &event.event_type, event.created, e)
                    .await
            }
            ProviderEventKind::SetupIntent(e) => {
                self.deposits
                    .on_setup_intent_event(&event.id, &event.event_type, e)
                    .await
            }
            ProviderEventKind::Account(AccountEvent::Updated(status)) => {
                self.stores.apply_account_update(status).await
            }
            ProviderEventKind::Charge(ChargeEvent::Refunded(refund)) => {
                self.on_charge_refunded(refund).await
            }
            ProviderEventKind::Unknown(kind) => {
                info!(kind, "Unhandled webhook event type");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Marks a fully refunded rental or damage payment as refunded.
    ///
    /// Deposit refunds are settled through their own `deposit_return` rows.
    async fn on_charge_refunded(
        &self,
        refund: &ChargeRefunded,
    ) -> Result<WebhookOutcome, AppError> {
        let Some(reference) = refund.payment_intent.as_deref() else {
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(payment) = self.ctx.repo.find_payment_by_reference(reference).await? else {
            info!(reference, "Refund for a payment this engine did not record");
            return Ok(WebhookOutcome::Ignored);
        };
        if !refund.fully_refunded || payment.payment_type == PaymentType::Deposit {
            return Ok(WebhookOutcome::Ignored);
        }
        if payment.status == PaymentStatus::Refunded {
            return Ok(WebhookOutcome::Duplicate);
        }

        self.ctx
            .repo
            .update_payment_status(reference, PaymentStatus::Refunded)
            .await?;
        self.ctx
            .audit(
                payment.reservation_id,
                "webhook",
                "payment.refunded",
                json!({
                    "payment_id": payment.id,
                    "charge_id": refund.charge_id,
                    "amount": payment.amount,
                }),
            )
            .await;
        Ok(WebhookOutcome::Processed)
    }
}
