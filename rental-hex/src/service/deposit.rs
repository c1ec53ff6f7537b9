//! Deposit authorization holds: request, confirm, capture, release, expiry.
//!
//! Every change to `Reservation::deposit` goes through [`reduce`]. Callers
//! (staff actions) get an error for illegal moves; provider events that do
//! not fit the current state are recorded as audit entries and dropped.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use rental_types::domain::provider::metadata::DEPOSIT_PURPOSE;
use rental_types::domain::{
    AUTHORIZATION_HOLD_DAYS, DepositEvent, DomainEvent, IntentStatus, NewPayment, PaymentIntent,
    PaymentIntentEvent, PaymentMethod, PaymentStatus, PaymentType, Reduction, SetupIntentEvent,
    from_minor_units, reduce, to_minor_units,
};
use rental_types::ports::{CreatePaymentIntent, CreateRefund, CreateSetupIntent, RefundReason};
use rental_types::{
    AppError, AuthorizationMode, AuthorizeDepositRequest, AuthorizeDepositResponse,
    CancelSideEffect, CaptureDepositRequest, DepositStatus as S, GatewayError, GatewayFactory,
    Payment, PaymentGateway, Reservation, ReservationId, ReservationRepository,
    ReturnDepositRequest,
};

use super::ServiceContext;
use super::retry::with_backoff;
use super::webhook::WebhookOutcome;

/// Expired authorizations handled per sweep.
const EXPIRY_BATCH: i64 = 100;

/// Counts from one expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpiryReport {
    pub checked: usize,
    pub released: usize,
    pub captured: usize,
    pub failed: usize,
    /// Past the local expiry but still capturable at the provider.
    pub still_held: usize,
    pub errors: usize,
}

enum ExpiryOutcome {
    Skipped,
    Released,
    Captured,
    Failed,
    StillHeld,
}

/// Folds a caller-driven event, turning an illegal edge into `InvalidState`.
fn advance(reservation: &mut Reservation, event: &DepositEvent) -> Result<(), AppError> {
    match reduce(&reservation.deposit, reservation.deposit_amount, event, false) {
        Reduction::Applied(next) => {
            reservation.deposit = next;
            Ok(())
        }
        Reduction::Duplicate => Ok(()),
        Reduction::Ignored { reason } => Err(AppError::InvalidState(reason)),
    }
}

fn notification(reservation: &Reservation, event: &DepositEvent) -> Option<DomainEvent> {
    let reservation_id = reservation.id;
    let currency = reservation.currency.clone();
    match event {
        DepositEvent::AuthorizationRequested {
            amount,
            setup_intent,
            ..
        } => Some(DomainEvent::DepositAuthorizationRequested {
            reservation_id,
            amount: *amount,
            currency,
            card_only: *setup_intent,
        }),
        DepositEvent::CardSaved => None,
        DepositEvent::Authorized { amount, .. } => Some(DomainEvent::DepositAuthorized {
            reservation_id,
            amount: *amount,
            currency,
            expires_at: reservation.deposit.expires_at(),
        }),
        DepositEvent::Captured { amount } => Some(DomainEvent::DepositCaptured {
            reservation_id,
            amount: *amount,
            currency,
        }),
        DepositEvent::Released => Some(DomainEvent::DepositReleased { reservation_id }),
        DepositEvent::Failed { reason } => Some(DomainEvent::DepositFailed {
            reservation_id,
            reason: reason.clone(),
        }),
    }
}

fn current_intent(reservation: &Reservation) -> Result<String, AppError> {
    reservation
        .deposit
        .intent_ref()
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal(format!("Deposit of {} has no intent", reservation.id)))
}

/// Best-effort cancel of an intent nothing will confirm any more.
async fn abandon_payment_intent(gateway: &impl PaymentGateway, intent_id: &str) {
    if let Err(e) = gateway.cancel_payment_intent(intent_id).await {
        warn!(intent_id, "Could not cancel abandoned payment intent: {}", e);
    }
}

async fn abandon_setup_intent(gateway: &impl PaymentGateway, setup_id: &str) {
    if let Err(e) = gateway.cancel_setup_intent(setup_id).await {
        warn!(setup_id, "Could not cancel superseded setup intent: {}", e);
    }
}

/// Manages the security-deposit hold of each reservation.
pub struct DepositAuthorizationManager<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
}

impl<R, G> Clone for DepositAuthorizationManager<R, G> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<R: ReservationRepository, G: GatewayFactory> DepositAuthorizationManager<R, G> {
    pub(crate) fn new(ctx: Arc<ServiceContext<R, G>>) -> Self {
        Self { ctx }
    }

    /// Applies `events` in order, then persists, notifies and audits.
    async fn commit(
        &self,
        mut reservation: Reservation,
        events: &[DepositEvent],
        payment: Option<NewPayment>,
        actor: &str,
        detail: serde_json::Value,
    ) -> Result<Reservation, AppError> {
        for event in events {
            advance(&mut reservation, event)?;
        }
        let saved = self
            .ctx
            .repo
            .save_reservation(&reservation, payment)
            .await?
            .reservation;

        for event in events {
            info!(
                reservation_id = %saved.id,
                event = event.name(),
                deposit_status = %saved.deposit_status(),
                "Deposit transition applied"
            );
            if let Some(notification) = notification(&saved, event) {
                self.ctx.emit(notification).await;
            }
            self.ctx
                .audit(saved.id, actor, &format!("deposit.{}", event.name()), detail.clone())
                .await;
        }
        Ok(saved)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Authorization requests
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts (or resumes) a deposit hold.
    ///
    /// Interactive requests return a client secret for the customer. For
    /// rentals starting after the hold window, the customer only saves a card.
    /// Off-session requests confirm immediately with the saved card; a decline
    /// leaves the deposit untouched and cancels the intent it created.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id, mode = ?req.mode))]
    pub async fn request_authorization(
        &self,
        id: ReservationId,
        req: AuthorizeDepositRequest,
        actor: &str,
    ) -> Result<AuthorizeDepositResponse, AppError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;

        if !reservation.has_deposit() {
            return Err(AppError::Validation("Reservation has no deposit".into()));
        }
        if reservation.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Cannot request a deposit while reservation is {}",
                reservation.status
            )));
        }
        let amount = req.amount.unwrap_or(reservation.deposit_amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Deposit amount must be positive".into(),
            ));
        }

        let gateway = self.ctx.store_gateway(&reservation).await?;
        match req.mode {
            AuthorizationMode::Interactive => {
                self.request_interactive(reservation, amount, &gateway, actor)
                    .await
            }
            AuthorizationMode::OffSession => {
                self.request_off_session(reservation, amount, &gateway, actor)
                    .await
            }
        }
    }

    async fn request_interactive(
        &self,
        reservation: Reservation,
        amount: Decimal,
        gateway: &G::Gateway,
        actor: &str,
    ) -> Result<AuthorizeDepositResponse, AppError> {
        reservation
            .deposit
            .require("request a deposit authorization", &[S::None, S::Pending])?;

        if reservation.deposit_status() == S::Pending {
            return self.resume_pending(&reservation, gateway).await;
        }

        let metadata = ServiceContext::<R, G>::metadata(&reservation, DEPOSIT_PURPOSE);
        let card_only =
            reservation.start_date > Utc::now() + Duration::days(AUTHORIZATION_HOLD_DAYS);

        let (intent_id, client_secret) = if card_only {
            let setup = gateway
                .create_setup_intent(CreateSetupIntent {
                    customer: reservation.gateway_customer.clone(),
                    metadata,
                    idempotency_key: Some(format!(
                        "deposit-setup-{}-v{}",
                        reservation.id, reservation.version
                    )),
                })
                .await?;
            (setup.id, setup.client_secret)
        } else {
            let intent = gateway
                .create_payment_intent(CreatePaymentIntent {
                    amount: to_minor_units(amount, &reservation.currency)?,
                    currency: reservation.currency.clone(),
                    manual_capture: true,
                    customer: reservation.gateway_customer.clone(),
                    payment_method: None,
                    description: Some(format!("Security deposit for {}", reservation.number)),
                    metadata,
                    idempotency_key: Some(format!(
                        "deposit-{}-v{}",
                        reservation.id, reservation.version
                    )),
                })
                .await?;
            (intent.id, intent.client_secret)
        };

        let event = DepositEvent::AuthorizationRequested {
            intent_ref: intent_id.clone(),
            amount,
            setup_intent: card_only,
        };
        let detail = json!({ "intent_id": intent_id, "amount": amount, "card_only": card_only });
        self.commit(reservation, &[event], None, actor, detail)
            .await?;

        Ok(AuthorizeDepositResponse {
            deposit_status: S::Pending,
            intent_id: Some(intent_id),
            client_secret,
            card_only,
        })
    }

    /// Hands out the client secret of the request already in flight.
    async fn resume_pending(
        &self,
        reservation: &Reservation,
        gateway: &G::Gateway,
    ) -> Result<AuthorizeDepositResponse, AppError> {
        let intent_id = current_intent(reservation)?;
        let retry = &self.ctx.settings.retry;
        let card_only = reservation.deposit.is_setup_intent();

        let client_secret = if card_only {
            with_backoff(retry, "retrieve_setup_intent", || {
                gateway.retrieve_setup_intent(&intent_id)
            })
            .await?
            .client_secret
        } else {
            with_backoff(retry, "retrieve_payment_intent", || {
                gateway.retrieve_payment_intent(&intent_id)
            })
            .await?
            .client_secret
        };

        Ok(AuthorizeDepositResponse {
            deposit_status: S::Pending,
            intent_id: Some(intent_id),
            client_secret,
            card_only,
        })
    }

    async fn request_off_session(
        &self,
        reservation: Reservation,
        amount: Decimal,
        gateway: &G::Gateway,
        actor: &str,
    ) -> Result<AuthorizeDepositResponse, AppError> {
        reservation.deposit.require(
            "authorize the deposit off-session",
            &[S::None, S::Pending, S::CardSaved],
        )?;
        let payment_method = reservation.saved_payment_method.clone().ok_or_else(|| {
            AppError::Validation("Reservation has no saved payment method".into())
        })?;

        let mut events = Vec::new();
        let resumable =
            reservation.deposit_status() == S::Pending && !reservation.deposit.is_setup_intent();
        let pending_setup = (reservation.deposit_status() == S::Pending
            && reservation.deposit.is_setup_intent())
        .then(|| reservation.deposit.intent_ref().map(str::to_string))
        .flatten();

        let intent_id = if resumable {
            current_intent(&reservation)?
        } else {
            let created = gateway
                .create_payment_intent(CreatePaymentIntent {
                    amount: to_minor_units(amount, &reservation.currency)?,
                    currency: reservation.currency.clone(),
                    manual_capture: true,
                    customer: reservation.gateway_customer.clone(),
                    payment_method: Some(payment_method.clone()),
                    description: Some(format!("Security deposit for {}", reservation.number)),
                    metadata: ServiceContext::<R, G>::metadata(&reservation, DEPOSIT_PURPOSE),
                    idempotency_key: Some(format!(
                        "deposit-offsession-{}-v{}-{}",
                        reservation.id, reservation.version, payment_method
                    )),
                })
                .await?;
            if reservation.deposit_status() == S::None {
                events.push(DepositEvent::AuthorizationRequested {
                    intent_ref: created.id.clone(),
                    amount,
                    setup_intent: false,
                });
            }
            created.id
        };

        let confirmed = match self
            .confirm_or_requery(gateway, &intent_id, &payment_method)
            .await
        {
            Ok(intent) if intent.status == IntentStatus::RequiresCapture => Ok(intent),
            Ok(intent) => Err(AppError::ProviderRejected {
                code: Some("authorization_incomplete".into()),
                message: intent.last_error.unwrap_or_else(|| {
                    format!("Hold was not placed, intent is {:?}", intent.status)
                }),
            }),
            Err(e) => Err(e),
        };
        let intent = match confirmed {
            Ok(intent) => intent,
            Err(e) => {
                if !resumable {
                    abandon_payment_intent(gateway, &intent_id).await;
                }
                return Err(e);
            }
        };
        if let Some(setup_id) = &pending_setup {
            abandon_setup_intent(gateway, setup_id).await;
        }

        let held = if intent.amount_capturable > 0 {
            from_minor_units(intent.amount_capturable, &reservation.currency)
        } else {
            amount
        };
        events.push(DepositEvent::Authorized {
            intent_ref: intent_id.clone(),
            amount: held,
            confirmed_at: Utc::now(),
        });

        let detail = json!({ "intent_id": intent_id, "amount": held, "off_session": true });
        let saved = self
            .commit(reservation, &events, None, actor, detail)
            .await?;

        Ok(AuthorizeDepositResponse {
            deposit_status: saved.deposit_status(),
            intent_id: Some(intent_id),
            client_secret: None,
            card_only: false,
        })
    }

    /// Confirms off-session; after a timeout the provider is asked what happened.
    async fn confirm_or_requery(
        &self,
        gateway: &G::Gateway,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<PaymentIntent, AppError> {
        match gateway
            .confirm_payment_intent(intent_id, payment_method, true)
            .await
        {
            Ok(intent) => Ok(intent),
            Err(GatewayError::Unavailable(msg)) => {
                warn!(intent_id, "Confirmation outcome unknown, re-querying provider: {}", msg);
                let intent = with_backoff(&self.ctx.settings.retry, "retrieve_payment_intent", || {
                    gateway.retrieve_payment_intent(intent_id)
                })
                .await?;
                if intent.status == IntentStatus::RequiresCapture {
                    Ok(intent)
                } else {
                    Err(AppError::ProviderUnavailable(msg))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Capture, release, return
    // ─────────────────────────────────────────────────────────────────────────────

    /// Captures all or part of the hold and records the deposit payment.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id))]
    pub async fn capture(
        &self,
        id: ReservationId,
        req: CaptureDepositRequest,
        actor: &str,
    ) -> Result<Reservation, AppError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;
        reservation.deposit.require("capture the deposit", &[S::Authorized])?;

        let held = reservation.deposit.hold_amount().unwrap_or(Decimal::ZERO);
        let amount = req.amount.unwrap_or(held);
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Capture amount must be positive".into(),
            ));
        }
        if amount > held {
            return Err(AppError::AmountExceedsAuthorization {
                requested: amount,
                authorized: held,
            });
        }

        let gateway = self.ctx.store_gateway(&reservation).await?;
        let intent_id = current_intent(&reservation)?;
        let minor = to_minor_units(amount, &reservation.currency)?;

        let intent = match gateway.capture_payment_intent(&intent_id, Some(minor)).await {
            Ok(intent) => intent,
            Err(GatewayError::Unavailable(msg)) => {
                // Never repeat a capture blindly: ask the provider what happened.
                warn!("Capture outcome unknown, re-querying provider: {}", msg);
                let intent = with_backoff(&self.ctx.settings.retry, "retrieve_payment_intent", || {
                    gateway.retrieve_payment_intent(&intent_id)
                })
                .await?;
                match intent.status {
                    IntentStatus::Succeeded => intent,
                    IntentStatus::RequiresCapture => return Err(AppError::ProviderUnavailable(msg)),
                    other => {
                        return Err(AppError::ProviderRejected {
                            code: None,
                            message: format!("Capture did not complete, intent is {:?}", other),
                        });
                    }
                }
            }
            Err(e) => return Err(e.into()),
        };

        let captured = if intent.amount_received > 0 {
            from_minor_units(intent.amount_received, &reservation.currency)
        } else {
            amount
        };
        let payment = NewPayment::completed(
            id,
            PaymentType::Deposit,
            PaymentMethod::Gateway,
            captured,
            reservation.currency.clone(),
            Some(intent_id.clone()),
        )?;

        let detail = json!({ "intent_id": intent_id, "amount": captured, "held": held });
        self.commit(
            reservation,
            &[DepositEvent::Captured { amount: captured }],
            Some(payment),
            actor,
            detail,
        )
        .await
    }

    /// Cancels the hold (or forgets the saved card) without moving funds.
    #[tracing::instrument(skip(self), fields(reservation_id = %id))]
    pub async fn release(&self, id: ReservationId, actor: &str) -> Result<Reservation, AppError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;
        self.release_locked(reservation, actor).await
    }

    /// Release body; the caller holds the reservation lock.
    pub(crate) async fn release_locked(
        &self,
        reservation: Reservation,
        actor: &str,
    ) -> Result<Reservation, AppError> {
        reservation
            .deposit
            .require("release the deposit", &[S::Authorized, S::CardSaved])?;

        let mut detail = json!({});
        if reservation.deposit_status() == S::Authorized {
            let gateway = self.ctx.store_gateway(&reservation).await?;
            let intent_id = current_intent(&reservation)?;

            if let Err(err) = gateway.cancel_payment_intent(&intent_id).await {
                // Already cancelled at the provider (for instance expired) counts as released.
                let intent = with_backoff(&self.ctx.settings.retry, "retrieve_payment_intent", || {
                    gateway.retrieve_payment_intent(&intent_id)
                })
                .await?;
                if intent.status != IntentStatus::Canceled {
                    return Err(err.into());
                }
                info!(intent_id = %intent_id, "Hold was already cancelled at the provider");
            }
            detail = json!({ "intent_id": intent_id });
        }

        self.commit(reservation, &[DepositEvent::Released], None, actor, detail)
            .await
    }

    /// Decides and performs the deposit side effect of cancelling a reservation.
    ///
    /// | deposit      | effect                                          |
    /// |--------------|-------------------------------------------------|
    /// | none         | nothing                                         |
    /// | pending      | cancel the provider intent, status stays pending |
    /// | card_saved   | release                                         |
    /// | authorized   | release (cancel aborts if it fails)             |
    /// | captured     | nothing; staff must record a deposit return     |
    /// | released     | nothing                                         |
    /// | failed       | nothing                                         |
    pub(crate) async fn settle_for_cancellation(
        &self,
        reservation: Reservation,
        actor: &str,
    ) -> Result<(Reservation, CancelSideEffect), AppError> {
        match reservation.deposit_status() {
            S::None | S::Released | S::Failed => Ok((reservation, CancelSideEffect::None)),
            S::Pending => {
                let gateway = self.ctx.store_gateway(&reservation).await?;
                let intent_id = current_intent(&reservation)?;
                if reservation.deposit.is_setup_intent() {
                    gateway.cancel_setup_intent(&intent_id).await?;
                } else {
                    gateway.cancel_payment_intent(&intent_id).await?;
                }
                self.ctx
                    .audit(
                        reservation.id,
                        actor,
                        "deposit.authorization_cancelled",
                        json!({ "intent_id": intent_id }),
                    )
                    .await;
                Ok((reservation, CancelSideEffect::AuthorizationCancelled))
            }
            S::CardSaved | S::Authorized => {
                let released = self.release_locked(reservation, actor).await?;
                Ok((released, CancelSideEffect::DepositReleased))
            }
            S::Captured => Ok((reservation, CancelSideEffect::DepositReturnRequired)),
        }
    }

    /// Records money handed back to the customer as a `deposit_return` payment.
    ///
    /// A gateway return refunds the captured charge. The deposit status is
    /// never changed by a return.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id, method = %req.method))]
    pub async fn return_deposit(
        &self,
        id: ReservationId,
        req: ReturnDepositRequest,
        actor: &str,
    ) -> Result<Payment, AppError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;

        if req.amount <= Decimal::ZERO {
            return Err(AppError::Validation("Return amount must be positive".into()));
        }

        let (payments, ledger) = self.ctx.ledger(id).await?;
        let held = ledger.net_deposit_held();
        if req.amount > held {
            return Err(AppError::AmountExceedsAuthorization {
                requested: req.amount,
                authorized: held,
            });
        }

        let external_reference = if req.method == PaymentMethod::Gateway {
            reservation
                .deposit
                .require("refund the deposit", &[S::Captured])?;

            let returned: Decimal = payments
                .iter()
                .filter(|p| {
                    p.payment_type == PaymentType::DepositReturn
                        && p.method == PaymentMethod::Gateway
                        && p.status == PaymentStatus::Completed
                })
                .map(|p| p.amount)
                .sum();
            let refundable = reservation.deposit.captured_amount().unwrap_or(Decimal::ZERO) - returned;
            if req.amount > refundable {
                return Err(AppError::AmountExceedsAuthorization {
                    requested: req.amount,
                    authorized: refundable,
                });
            }

            let gateway = self.ctx.store_gateway(&reservation).await?;
            let intent_id = current_intent(&reservation)?;
            let intent = with_backoff(&self.ctx.settings.retry, "retrieve_payment_intent", || {
                gateway.retrieve_payment_intent(&intent_id)
            })
            .await?;
            let charge = intent.latest_charge.ok_or_else(|| AppError::ProviderRejected {
                code: None,
                message: "Captured deposit has no charge to refund".into(),
            })?;

            let attempt = payments
                .iter()
                .filter(|p| p.payment_type == PaymentType::DepositReturn)
                .count();
            let refund = gateway
                .create_refund(CreateRefund {
                    charge,
                    amount: Some(to_minor_units(req.amount, &reservation.currency)?),
                    reason: RefundReason::RequestedByCustomer,
                    metadata: ServiceContext::<R, G>::metadata(&reservation, DEPOSIT_PURPOSE),
                    idempotency_key: Some(format!("deposit-return-{}-{}", id, attempt)),
                })
                .await?;
            Some(refund.id)
        } else {
            None
        };

        let record = self
            .ctx
            .repo
            .record_payment(NewPayment::completed(
                id,
                PaymentType::DepositReturn,
                req.method,
                req.amount,
                reservation.currency.clone(),
                external_reference.clone(),
            )?)
            .await?;

        if record.is_created() {
            self.ctx
                .emit(DomainEvent::DepositReturned {
                    reservation_id: id,
                    amount: req.amount,
                    currency: reservation.currency.clone(),
                })
                .await;
            self.ctx
                .audit(
                    id,
                    actor,
                    "deposit.returned",
                    json!({
                        "amount": req.amount,
                        "method": req.method,
                        "refund_id": external_reference,
                    }),
                )
                .await;
        }
        Ok(record.payment().clone())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Provider events
    // ─────────────────────────────────────────────────────────────────────────────

    /// Folds a provider event that may not fit the current state.
    ///
    /// Dedup is checked and recorded under the reservation lock, so two
    /// concurrent deliveries of one event cannot both apply.
    async fn apply_provider_event(
        &self,
        reservation: Reservation,
        event_id: &str,
        event_type: &str,
        event: DepositEvent,
        payment: Option<NewPayment>,
    ) -> Result<WebhookOutcome, AppError> {
        let outcome = match reduce(
            &reservation.deposit,
            reservation.deposit_amount,
            &event,
            false,
        ) {
            Reduction::Applied(_) => {
                let detail = json!({ "event_id": event_id, "event_type": event_type });
                self.commit(reservation, &[event], payment, "webhook", detail)
                    .await?;
                WebhookOutcome::Processed
            }
            Reduction::Duplicate => WebhookOutcome::Duplicate,
            Reduction::Ignored { reason } => {
                self.record_ignored(&reservation, event_id, event_type, event.name(), &reason)
                    .await;
                WebhookOutcome::Ignored
            }
        };
        self.ctx
            .repo
            .mark_event_processed(event_id, event_type)
            .await?;
        Ok(outcome)
    }

    async fn record_ignored(
        &self,
        reservation: &Reservation,
        event_id: &str,
        event_type: &str,
        event: &str,
        reason: &str,
    ) {
        info!(
            reservation_id = %reservation.id,
            event_id,
            event,
            reason,
            "Provider event ignored"
        );
        self.ctx
            .audit(
                reservation.id,
                "webhook",
                "deposit.event_ignored",
                json!({
                    "event_id": event_id,
                    "event_type": event_type,
                    "event": event,
                    "deposit_status": reservation.deposit_status(),
                    "reason": reason,
                }),
            )
            .await;
    }

    /// Handles payment-intent events for deposit holds.
    #[tracing::instrument(skip(self, event))]
    pub(crate) async fn on_payment_intent_event(
        &self,
        event_id: &str,
        event_type: &str,
        occurred_at: DateTime<Utc>,
        event: &PaymentIntentEvent,
    ) -> Result<WebhookOutcome, AppError> {
        let intent = match event {
            PaymentIntentEvent::AmountCapturableUpdated(pi)
            | PaymentIntentEvent::Succeeded(pi)
            | PaymentIntentEvent::Canceled(pi)
            | PaymentIntentEvent::PaymentFailed(pi) => pi,
        };
        if !intent.is_deposit() {
            tracing::debug!(intent_id = %intent.id, "Not a deposit intent");
            return Ok(WebhookOutcome::Ignored);
        }
        let Some(id) = intent.reservation_id() else {
            warn!(intent_id = %intent.id, "Deposit intent without reservation metadata");
            return Ok(WebhookOutcome::Ignored);
        };

        let _guard = self.ctx.locks.acquire(id).await;
        if self.ctx.repo.is_event_processed(event_id).await? {
            return Ok(WebhookOutcome::Duplicate);
        }
        let reservation = self.ctx.load(id).await?;
        let currency = &reservation.currency;

        let stale = reservation.deposit.intent_ref() != Some(intent.id.as_str());
        let (deposit_event, payment) = match event {
            PaymentIntentEvent::AmountCapturableUpdated(pi) => (
                DepositEvent::Authorized {
                    intent_ref: pi.id.clone(),
                    amount: from_minor_units(pi.amount_capturable, currency),
                    confirmed_at: occurred_at,
                },
                None,
            ),
            PaymentIntentEvent::Succeeded(pi) if !stale => {
                let amount = from_minor_units(pi.amount_received, currency);
                let payment = NewPayment::completed(
                    id,
                    PaymentType::Deposit,
                    PaymentMethod::Gateway,
                    amount,
                    currency.clone(),
                    Some(pi.id.clone()),
                )?;
                (DepositEvent::Captured { amount }, Some(payment))
            }
            PaymentIntentEvent::Canceled(_) if !stale => (DepositEvent::Released, None),
            PaymentIntentEvent::PaymentFailed(pi) => {
                // The customer may retry on the same intent.
                let reason = pi
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "payment failed".into());
                self.record_ignored(&reservation, event_id, event_type, "payment_failed", &reason)
                    .await;
                self.ctx
                    .repo
                    .mark_event_processed(event_id, event_type)
                    .await?;
                return Ok(WebhookOutcome::Ignored);
            }
            _ => {
                self.record_ignored(
                    &reservation,
                    event_id,
                    event_type,
                    event_type,
                    &format!("intent {} is not the current deposit intent", intent.id),
                )
                .await;
                self.ctx
                    .repo
                    .mark_event_processed(event_id, event_type)
                    .await?;
                return Ok(WebhookOutcome::Ignored);
            }
        };

        self.apply_provider_event(reservation, event_id, event_type, deposit_event, payment)
            .await
    }

    /// Handles card-saving setup intents for far-future rentals.
    #[tracing::instrument(skip(self, event))]
    pub(crate) async fn on_setup_intent_event(
        &self,
        event_id: &str,
        event_type: &str,
        event: &SetupIntentEvent,
    ) -> Result<WebhookOutcome, AppError> {
        let setup = match event {
            SetupIntentEvent::Succeeded(si) | SetupIntentEvent::SetupFailed(si) => si,
        };
        let Some(id) = setup.reservation_id() else {
            warn!(setup_id = %setup.id, "Setup intent without reservation metadata");
            return Ok(WebhookOutcome::Ignored);
        };

        let _guard = self.ctx.locks.acquire(id).await;
        if self.ctx.repo.is_event_processed(event_id).await? {
            return Ok(WebhookOutcome::Duplicate);
        }
        let mut reservation = self.ctx.load(id).await?;

        let current = reservation.deposit.is_setup_intent()
            && reservation.deposit.intent_ref() == Some(setup.id.as_str());
        match event {
            SetupIntentEvent::Succeeded(si) if current => {
                if si.payment_method.is_some() {
                    reservation.saved_payment_method = si.payment_method.clone();
                }
                self.apply_provider_event(
                    reservation,
                    event_id,
                    event_type,
                    DepositEvent::CardSaved,
                    None,
                )
                .await
            }
            _ => {
                let reason = match event {
                    SetupIntentEvent::SetupFailed(si) => si
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "card setup failed".into()),
                    SetupIntentEvent::Succeeded(_) => {
                        format!("setup intent {} is not the current deposit intent", setup.id)
                    }
                };
                self.record_ignored(&reservation, event_id, event_type, event_type, &reason)
                    .await;
                self.ctx
                    .repo
                    .mark_event_processed(event_id, event_type)
                    .await?;
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Expiry reconciliation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Re-checks every authorized hold whose local expiry passed before `now`.
    ///
    /// Providers may drop an expired hold without sending an event, so the
    /// intent is queried and the deposit follows what the provider reports.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_expiry(&self, now: DateTime<Utc>) -> Result<ExpiryReport, AppError> {
        let ids = self
            .ctx
            .repo
            .list_expired_authorizations(now, EXPIRY_BATCH)
            .await?;

        let mut report = ExpiryReport::default();
        for id in ids {
            report.checked += 1;
            match self.reconcile_one(id, now).await {
                Ok(ExpiryOutcome::Released) => report.released += 1,
                Ok(ExpiryOutcome::Captured) => report.captured += 1,
                Ok(ExpiryOutcome::Failed) => report.failed += 1,
                Ok(ExpiryOutcome::StillHeld) => report.still_held += 1,
                Ok(ExpiryOutcome::Skipped) => {}
                Err(e) => {
                    tracing::error!(reservation_id = %id, "Expiry reconciliation failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        if report.checked > 0 {
            info!(?report, "Expiry sweep finished");
        }
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<ExpiryOutcome, AppError> {
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;

        // A webhook or staff action may have settled the hold meanwhile.
        let expired = reservation.deposit.expires_at().is_some_and(|at| at < now);
        if reservation.deposit_status() != S::Authorized || !expired {
            return Ok(ExpiryOutcome::Skipped);
        }

        let gateway = self.ctx.store_gateway(&reservation).await?;
        let intent_id = current_intent(&reservation)?;
        let intent = with_backoff(&self.ctx.settings.retry, "retrieve_payment_intent", || {
            gateway.retrieve_payment_intent(&intent_id)
        })
        .await?;

        let detail = json!({ "intent_id": intent_id, "provider_status": intent.status });
        let (outcome, event, payment) = match intent.status {
            IntentStatus::Canceled => (ExpiryOutcome::Released, DepositEvent::Released, None),
            IntentStatus::Succeeded => {
                let amount = from_minor_units(intent.amount_received, &reservation.currency);
                let payment = NewPayment::completed(
                    id,
                    PaymentType::Deposit,
                    PaymentMethod::Gateway,
                    amount,
                    reservation.currency.clone(),
                    Some(intent_id.clone()),
                )?;
                (
                    ExpiryOutcome::Captured,
                    DepositEvent::Captured { amount },
                    Some(payment),
                )
            }
            IntentStatus::RequiresCapture => {
                info!(reservation_id = %id, "Hold past local expiry is still capturable");
                return Ok(ExpiryOutcome::StillHeld);
            }
            IntentStatus::Processing
            | IntentStatus::RequiresConfirmation
            | IntentStatus::RequiresAction => {
                info!(
                    reservation_id = %id,
                    provider_status = ?intent.status,
                    "Hold past local expiry is still in flight at the provider"
                );
                return Ok(ExpiryOutcome::StillHeld);
            }
            // The authorization was voided and the intent fell back to needing a card.
            IntentStatus::RequiresPaymentMethod => (
                ExpiryOutcome::Failed,
                DepositEvent::Failed {
                    reason: intent
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "authorization lost at the provider".into()),
                },
                None,
            ),
        };

        self.commit(reservation, &[event], payment, "sweeper", detail)
            .await?;
        Ok(outcome)
    }
}
