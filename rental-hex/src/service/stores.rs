//! Store sub-account onboarding and bookkeeping.

use std::sync::Arc;

use tracing::{info, warn};

use rental_types::domain::SubAccountStatus;
use rental_types::ports::CreateSubAccount;
use rental_types::{
    AppError, ConnectStoreRequest, GatewayFactory, OnboardingLinkRequest, PaymentGateway,
    ReservationRepository, StoreAccount, StoreId,
};

use super::ServiceContext;
use super::retry::with_backoff;
use super::webhook::WebhookOutcome;

/// Onboards stores onto the platform and mirrors their account status.
pub struct StoreOnboarding<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
}

impl<R, G> Clone for StoreOnboarding<R, G> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<R: ReservationRepository, G: GatewayFactory> StoreOnboarding<R, G> {
    pub(crate) fn new(ctx: Arc<ServiceContext<R, G>>) -> Self {
        Self { ctx }
    }

    async fn connected(&self, store_id: StoreId) -> Result<(StoreAccount, String), AppError> {
        let store = self
            .ctx
            .repo
            .get_store(store_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Store {}", store_id)))?;
        let account = store
            .gateway_account_id
            .clone()
            .ok_or_else(|| AppError::Validation("Store has not connected a payment account".into()))?;
        Ok((store, account))
    }

    /// Creates the store's sub-account, or returns the one already created.
    #[tracing::instrument(skip(self, req), fields(store_id = %store_id))]
    pub async fn connect(
        &self,
        store_id: StoreId,
        req: ConnectStoreRequest,
    ) -> Result<StoreAccount, AppError> {
        if let Some(store) = self.ctx.repo.get_store(store_id).await? {
            if store.gateway_account_id.is_some() {
                return Ok(store);
            }
        }
        if req.email.trim().is_empty() || req.country.trim().len() != 2 {
            return Err(AppError::Validation(
                "A store needs an email and a two-letter country".into(),
            ));
        }

        let status = self
            .ctx
            .gateways
            .platform()
            .create_sub_account(CreateSubAccount {
                email: req.email,
                country: req.country.to_ascii_uppercase(),
            })
            .await?;

        let mut store = StoreAccount::unconnected(store_id);
        store.apply_status(&status);
        self.ctx.repo.upsert_store(&store).await?;
        info!(account_id = %status.account_id, "Store connected");
        Ok(store)
    }

    pub async fn onboarding_link(
        &self,
        store_id: StoreId,
        req: OnboardingLinkRequest,
    ) -> Result<String, AppError> {
        let (_, account) = self.connected(store_id).await?;
        let url = self
            .ctx
            .gateways
            .platform()
            .create_onboarding_link(&account, &req.return_url, &req.refresh_url)
            .await?;
        Ok(url)
    }

    /// Pulls the current account status from the provider.
    #[tracing::instrument(skip(self), fields(store_id = %store_id))]
    pub async fn refresh_status(&self, store_id: StoreId) -> Result<StoreAccount, AppError> {
        let (mut store, account) = self.connected(store_id).await?;
        let gateway = self.ctx.gateways.platform();
        let status = with_backoff(&self.ctx.settings.retry, "get_sub_account_status", || {
            gateway.get_sub_account_status(&account)
        })
        .await?;
        store.apply_status(&status);
        self.ctx.repo.upsert_store(&store).await?;
        Ok(store)
    }

    pub async fn get(&self, store_id: StoreId) -> Result<StoreAccount, AppError> {
        self.ctx
            .repo
            .get_store(store_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Store {}", store_id)))
    }

    /// Mirrors an `account.updated` event onto the store record.
    pub(crate) async fn apply_account_update(
        &self,
        status: &SubAccountStatus,
    ) -> Result<WebhookOutcome, AppError> {
        let Some(mut store) = self
            .ctx
            .repo
            .find_store_by_gateway_account(&status.account_id)
            .await?
        else {
            warn!(account_id = %status.account_id, "Account update for unknown store");
            return Ok(WebhookOutcome::Ignored);
        };
        store.apply_status(status);
        self.ctx.repo.upsert_store(&store).await?;
        info!(
            store_id = %store.store_id,
            charges_enabled = store.charges_enabled,
            "Store account updated"
        );
        Ok(WebhookOutcome::Processed)
    }
}
