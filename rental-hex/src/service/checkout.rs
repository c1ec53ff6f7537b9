//! Hosted checkout sessions and the rental payment ledger.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use rental_types::domain::{
    CheckoutSession, CheckoutSessionEvent, DomainEvent, NewPayment, PaymentMethod, PaymentType,
    from_minor_units, to_minor_units,
};
use rental_types::ports::{CheckoutLineItem, CreateCheckoutSession};
use rental_types::{
    AppError, CheckoutKind, CheckoutRequest, CheckoutResponse, DomainError, GatewayFactory, Payment,
    PaymentGateway, RecordPaymentRequest, ReservationId, ReservationRepository,
};

use super::ServiceContext;
use super::webhook::WebhookOutcome;

/// How long the customer has to finish a session.
fn session_lifetime(kind: CheckoutKind) -> Duration {
    match kind {
        CheckoutKind::Initial => Duration::minutes(30),
        CheckoutKind::PaymentRequest => Duration::hours(24),
    }
}

/// Creates checkout sessions and records what they paid.
///
/// Opening a session never touches the ledger: the payment row is written
/// when the provider reports the session as paid.
pub struct CheckoutSessionManager<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
}

impl<R, G> Clone for CheckoutSessionManager<R, G> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<R: ReservationRepository, G: GatewayFactory> CheckoutSessionManager<R, G> {
    pub(crate) fn new(ctx: Arc<ServiceContext<R, G>>) -> Self {
        Self { ctx }
    }

    /// Opens a hosted checkout for the rental balance, explicit line items,
    /// or an explicit amount.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id, kind = ?req.kind))]
    pub async fn create_checkout(
        &self,
        id: ReservationId,
        req: CheckoutRequest,
    ) -> Result<CheckoutResponse, AppError> {
        let reservation = self.ctx.load(id).await?;
        if reservation.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Cannot take payment while reservation is {}",
                reservation.status
            )));
        }

        let purpose = req.purpose.unwrap_or(PaymentType::Rental);
        if !matches!(purpose, PaymentType::Rental | PaymentType::Damage) {
            return Err(AppError::Validation(format!(
                "Checkout cannot pay for {}",
                purpose
            )));
        }

        let currency = &reservation.currency;
        let line_items = if req.line_items.is_empty() {
            let amount = match (req.amount, purpose) {
                (Some(amount), _) => amount,
                (None, PaymentType::Rental) => {
                    let (_, ledger) = self.ctx.ledger(id).await?;
                    reservation.rental_balance(&ledger)
                }
                (None, _) => {
                    return Err(AppError::Validation(
                        "A damage payment needs an amount".into(),
                    ));
                }
            };
            let name = match purpose {
                PaymentType::Damage => format!("Damage charge for reservation {}", reservation.number),
                _ => format!("Reservation {}", reservation.number),
            };
            vec![CheckoutLineItem {
                name,
                quantity: 1,
                unit_amount: to_minor_units(amount, currency)?,
            }]
        } else {
            req.line_items
                .iter()
                .map(|item| {
                    if item.quantity == 0 || item.unit_amount <= Decimal::ZERO {
                        return Err(AppError::Validation(format!(
                            "Line item '{}' must have a positive quantity and amount",
                            item.name
                        )));
                    }
                    Ok(CheckoutLineItem {
                        name: item.name.clone(),
                        quantity: item.quantity,
                        unit_amount: to_minor_units(item.unit_amount, currency)?,
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?
        };

        let total = line_items
            .iter()
            .try_fold(0i64, |sum, item| {
                item.unit_amount
                    .checked_mul(i64::from(item.quantity))
                    .and_then(|line| sum.checked_add(line))
            })
            .ok_or(DomainError::AmountOutOfRange)?;
        if total <= 0 {
            return Err(AppError::Validation("Nothing to pay".into()));
        }

        let gateway = self.ctx.store_gateway(&reservation).await?;
        let expires_at = Utc::now() + session_lifetime(req.kind);
        let base = &self.ctx.settings.public_base_url;
        let session = gateway
            .create_checkout_session(CreateCheckoutSession {
                line_items,
                currency: currency.clone(),
                expires_at,
                success_url: format!(
                    "{base}/reservations/{id}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}"
                ),
                cancel_url: format!("{base}/reservations/{id}/checkout/cancel"),
                customer_email: req.customer_email,
                save_payment_method: true,
                metadata: ServiceContext::<R, G>::metadata(&reservation, purpose.as_ref()),
                idempotency_key: None,
            })
            .await?;

        info!(session_id = %session.id, total, "Checkout session created");
        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
            expires_at: session.expires_at.unwrap_or(expires_at),
        })
    }

    /// Dispatch target for checkout-session webhook events.
    pub(crate) async fn on_session_event(
        &self,
        event_id: &str,
        event: &CheckoutSessionEvent,
    ) -> Result<WebhookOutcome, AppError> {
        match event {
            CheckoutSessionEvent::Completed(session)
            | CheckoutSessionEvent::AsyncPaymentSucceeded(session) => {
                self.complete_from_session(session).await
            }
            CheckoutSessionEvent::AsyncPaymentFailed(session) => {
                if let Some(id) = session.reservation_id() {
                    self.ctx
                        .audit(
                            id,
                            "webhook",
                            "checkout.payment_failed",
                            json!({ "event_id": event_id, "session_id": session.id }),
                        )
                        .await;
                }
                info!(session_id = %session.id, "Checkout payment failed");
                Ok(WebhookOutcome::Ignored)
            }
            CheckoutSessionEvent::Expired(session) => {
                info!(session_id = %session.id, "Checkout session expired unpaid");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Records the payment of a paid session, once.
    ///
    /// The payment row and the saved card land in one write. A session that
    /// is not yet paid (delayed payment methods) is left for its follow-up event.
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn complete_from_session(
        &self,
        session: &CheckoutSession,
    ) -> Result<WebhookOutcome, AppError> {
        let Some(id) = session.reservation_id() else {
            tracing::warn!("Checkout session without reservation metadata");
            return Ok(WebhookOutcome::Ignored);
        };
        if !session.is_paid() {
            info!(payment_status = %session.payment_status, "Session not paid yet");
            return Ok(WebhookOutcome::Ignored);
        }

        let _guard = self.ctx.locks.acquire(id).await;
        let mut reservation = self.ctx.load(id).await?;

        if let Some(currency) = &session.currency {
            if *currency != reservation.currency {
                return Err(AppError::Validation(format!(
                    "Session paid in {}, reservation is in {}",
                    currency, reservation.currency
                )));
            }
        }
        let amount = from_minor_units(session.amount_total.unwrap_or(0), &reservation.currency);
        let payment_type = session.payment_type();
        let reference = session
            .payment_intent
            .clone()
            .unwrap_or_else(|| session.id.clone());
        let payment = NewPayment::completed(
            id,
            payment_type,
            PaymentMethod::Gateway,
            amount,
            reservation.currency.clone(),
            Some(reference.clone()),
        )?;

        if session.payment_method.is_some() {
            reservation.saved_payment_method = session.payment_method.clone();
        }
        if session.customer.is_some() {
            reservation.gateway_customer = session.customer.clone();
        }

        let saved = self
            .ctx
            .repo
            .save_reservation(&reservation, Some(payment))
            .await?;
        let created = saved.payment.as_ref().is_some_and(|p| p.is_created());
        if !created {
            return Ok(WebhookOutcome::Duplicate);
        }

        info!(reservation_id = %id, %amount, "Checkout payment recorded");
        self.ctx
            .emit(DomainEvent::RentalPaid {
                reservation_id: id,
                payment_type,
                amount,
                currency: reservation.currency.clone(),
            })
            .await;
        self.ctx
            .audit(
                id,
                "webhook",
                "checkout.completed",
                json!({
                    "session_id": session.id,
                    "reference": reference,
                    "amount": amount,
                    "payment_type": payment_type,
                    "card_saved": session.payment_method.is_some(),
                }),
            )
            .await;
        Ok(WebhookOutcome::Processed)
    }

    /// Staff-recorded payment taken outside the provider.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id, method = %req.method))]
    pub async fn record_offline_payment(
        &self,
        id: ReservationId,
        req: RecordPaymentRequest,
        actor: &str,
    ) -> Result<Payment, AppError> {
        if req.method == PaymentMethod::Gateway {
            return Err(AppError::Validation(
                "Gateway payments are recorded from provider events".into(),
            ));
        }
        if req.payment_type == PaymentType::DepositReturn {
            return Err(AppError::Validation(
                "Use the deposit return action to give a deposit back".into(),
            ));
        }

        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;
        let record = self
            .ctx
            .repo
            .record_payment(NewPayment::completed(
                id,
                req.payment_type,
                req.method,
                req.amount,
                reservation.currency.clone(),
                None,
            )?)
            .await?;
        let payment = record.payment().clone();

        if matches!(req.payment_type, PaymentType::Rental | PaymentType::Damage) {
            self.ctx
                .emit(DomainEvent::RentalPaid {
                    reservation_id: id,
                    payment_type: req.payment_type,
                    amount: req.amount,
                    currency: reservation.currency.clone(),
                })
                .await;
        }
        self.ctx
            .audit(
                id,
                actor,
                "payment.recorded",
                json!({
                    "payment_id": payment.id,
                    "payment_type": req.payment_type,
                    "method": req.method,
                    "amount": req.amount,
                }),
            )
            .await;
        Ok(payment)
    }
}
