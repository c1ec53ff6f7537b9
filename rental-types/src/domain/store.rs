//! Store (merchant) payment sub-account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::provider::SubAccountStatus;
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for a store.
    StoreId
);

/// Bookkeeping for a store's sub-account at the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StoreAccount {
    pub store_id: StoreId,
    /// Provider account id (`acct_...`); absent until the store connects.
    pub gateway_account_id: Option<String>,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub country: Option<String>,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StoreAccount {
    /// A store that has not connected a provider account yet.
    pub fn unconnected(store_id: StoreId) -> Self {
        Self {
            store_id,
            gateway_account_id: None,
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            country: None,
            email: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns the provider account id if the store can take payments.
    pub fn chargeable_account(&self) -> Result<&str, DomainError> {
        match &self.gateway_account_id {
            Some(id) if self.charges_enabled => Ok(id),
            _ => Err(DomainError::StoreNotOnboarded),
        }
    }

    /// Folds a provider status report into the bookkeeping record.
    pub fn apply_status(&mut self, status: &SubAccountStatus) {
        self.gateway_account_id = Some(status.account_id.clone());
        self.charges_enabled = status.charges_enabled;
        self.payouts_enabled = status.payouts_enabled;
        self.details_submitted = status.details_submitted;
        if status.country.is_some() {
            self.country = status.country.clone();
        }
        if status.email.is_some() {
            self.email = status.email.clone();
        }
        self.updated_at = Utc::now();
    }
}
