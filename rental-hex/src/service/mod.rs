//! Rental Payment Application Services
//!
//! Orchestrates domain operations through the repository and gateway ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! The managers share one [`ServiceContext`]; each is a cheap handle that can
//! be cloned into background tasks.

mod checkout;
mod deposit;
mod lifecycle;
pub mod locks;
pub mod retry;
mod stores;
mod webhook;

use std::sync::Arc;

use rental_types::domain::provider::{self, Metadata};
use rental_types::domain::{AuditEntry, DomainEvent, LedgerSummary};
use rental_types::{
    AppError, GatewayFactory, Payment, Reservation, ReservationId, ReservationRepository,
};

pub use checkout::CheckoutSessionManager;
pub use deposit::{DepositAuthorizationManager, ExpiryReport};
pub use lifecycle::ReservationStateMachine;
pub use locks::ReservationLocks;
pub use retry::RetryConfig;
pub use stores::StoreOnboarding;
pub use webhook::{WebhookOutcome, WebhookReconciler};

/// Settings the services need at runtime.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Base URL the provider redirects customers back to after checkout.
    pub public_base_url: String,
    /// Shared secret for provider webhook signatures.
    pub webhook_secret: String,
    pub retry: RetryConfig,
}

impl ServiceSettings {
    pub fn new(public_base_url: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            webhook_secret: webhook_secret.into(),
            retry: RetryConfig::default(),
        }
    }
}

/// State shared by all managers.
pub struct ServiceContext<R, G> {
    pub(crate) repo: R,
    pub(crate) gateways: G,
    pub(crate) locks: ReservationLocks,
    pub(crate) settings: ServiceSettings,
}

impl<R: ReservationRepository, G: GatewayFactory> ServiceContext<R, G> {
    pub(crate) async fn load(&self, id: ReservationId) -> Result<Reservation, AppError> {
        self.repo
            .get_reservation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {}", id)))
    }

    /// The gateway client of the store that owns `reservation`.
    pub(crate) async fn store_gateway(
        &self,
        reservation: &Reservation,
    ) -> Result<G::Gateway, AppError> {
        let store = self
            .repo
            .get_store(reservation.store_id)
            .await?
            .ok_or(rental_types::DomainError::StoreNotOnboarded)?;
        Ok(self.gateways.for_store(&store)?)
    }

    pub(crate) async fn ledger(
        &self,
        id: ReservationId,
    ) -> Result<(Vec<Payment>, LedgerSummary), AppError> {
        let payments = self.repo.list_payments(id).await?;
        let ledger = LedgerSummary::from_payments(&payments);
        Ok((payments, ledger))
    }

    /// Queues a notification. Never fails the committed transition.
    pub(crate) async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.repo.enqueue_domain_event(&event).await {
            tracing::error!(
                event_type = event.event_type(),
                reservation_id = %event.reservation_id(),
                "Failed to enqueue domain event: {}",
                e
            );
        }
    }

    pub(crate) async fn audit(
        &self,
        id: ReservationId,
        actor: &str,
        action: &str,
        detail: serde_json::Value,
    ) {
        if let Err(e) = self
            .repo
            .append_audit(AuditEntry::new(id, actor, action, detail))
            .await
        {
            tracing::error!(reservation_id = %id, action, "Failed to append audit entry: {}", e);
        }
    }

    /// Metadata that lets webhook events find their reservation again.
    pub(crate) fn metadata(reservation: &Reservation, purpose: &str) -> Metadata {
        Metadata::from([
            (
                provider::metadata::RESERVATION_ID.to_string(),
                reservation.id.to_string(),
            ),
            (
                provider::metadata::RESERVATION_NUMBER.to_string(),
                reservation.number.clone(),
            ),
            (provider::metadata::PURPOSE.to_string(), purpose.to_string()),
        ])
    }
}

/// Application service facade.
///
/// Generic over `R: ReservationRepository` and `G: GatewayFactory` - the
/// adapters are injected at compile time, so tests run against in-memory
/// doubles and production against SQL plus the real provider.
pub struct RentalService<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
    checkout: CheckoutSessionManager<R, G>,
    deposits: DepositAuthorizationManager<R, G>,
    lifecycle: ReservationStateMachine<R, G>,
    stores: StoreOnboarding<R, G>,
    webhooks: WebhookReconciler<R, G>,
}

impl<R: ReservationRepository, G: GatewayFactory> RentalService<R, G> {
    pub fn new(repo: R, gateways: G, settings: ServiceSettings) -> Self {
        let ctx = Arc::new(ServiceContext {
            repo,
            gateways,
            locks: ReservationLocks::new(),
            settings,
        });
        Self {
            checkout: CheckoutSessionManager::new(ctx.clone()),
            deposits: DepositAuthorizationManager::new(ctx.clone()),
            lifecycle: ReservationStateMachine::new(ctx.clone()),
            stores: StoreOnboarding::new(ctx.clone()),
            webhooks: WebhookReconciler::new(ctx.clone()),
            ctx,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.ctx.repo
    }

    pub fn checkout(&self) -> &CheckoutSessionManager<R, G> {
        &self.checkout
    }

    pub fn deposits(&self) -> &DepositAuthorizationManager<R, G> {
        &self.deposits
    }

    pub fn lifecycle(&self) -> &ReservationStateMachine<R, G> {
        &self.lifecycle
    }

    pub fn stores(&self) -> &StoreOnboarding<R, G> {
        &self.stores
    }

    pub fn webhooks(&self) -> &WebhookReconciler<R, G> {
        &self.webhooks
    }
}
