//! Reservation domain model and lifecycle rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::deposit::{DepositState, DepositStatus};
use super::money::CurrencyCode;
use super::payment::LedgerSummary;
use super::store::StoreId;
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for a Reservation.
    ReservationId
);

uuid_id!(
    /// Unique identifier for a customer.
    CustomerId
);

/// Business lifecycle of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Ongoing,
    Completed,
    Cancelled,
    Rejected,
}

str_enum!(ReservationStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Ongoing => "ongoing",
    Completed => "completed",
    Cancelled => "cancelled",
    Rejected => "rejected",
});

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled | ReservationStatus::Rejected
        )
    }
}

/// A staff-initiated lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReservationAction {
    Confirm,
    Reject,
    Pickup,
    Return,
    Cancel,
}

str_enum!(ReservationAction {
    Confirm => "confirm",
    Reject => "reject",
    Pickup => "pickup",
    Return => "return",
    Cancel => "cancel",
});

impl ReservationAction {
    /// Resolves the target status, or fails if the edge does not exist.
    pub fn target_from(&self, from: ReservationStatus) -> Result<ReservationStatus, DomainError> {
        use ReservationAction as A;
        use ReservationStatus as S;

        let target = match (self, from) {
            (A::Confirm, S::Pending) => S::Confirmed,
            (A::Reject, S::Pending) => S::Rejected,
            (A::Pickup, S::Confirmed) => S::Ongoing,
            (A::Return, S::Ongoing) => S::Completed,
            (A::Cancel, S::Pending | S::Confirmed | S::Ongoing) => S::Cancelled,
            _ => {
                return Err(DomainError::InvalidState {
                    action: self.to_string(),
                    state: format!("reservation is {from}"),
                });
            }
        };
        Ok(target)
    }

    /// Handover transitions compute payment warnings before proceeding.
    pub fn checks_payment_warnings(&self) -> bool {
        matches!(self, ReservationAction::Pickup | ReservationAction::Return)
    }
}

/// Soft warnings raised before handing over or taking back an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionWarning {
    /// Completed rental payments do not cover the rental portion.
    PaymentIncomplete,
    /// A deposit is configured but neither held nor collected offline.
    DepositNotCollected,
}

impl AsRef<str> for TransitionWarning {
    fn as_ref(&self) -> &str {
        match self {
            Self::PaymentIncomplete => "PAYMENT_INCOMPLETE",
            Self::DepositNotCollected => "DEPOSIT_NOT_COLLECTED",
        }
    }
}

/// A booking with its money state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: ReservationId,
    /// Human-readable reservation number shown to customers.
    pub number: String,
    pub status: ReservationStatus,
    pub store_id: StoreId,
    pub customer_id: CustomerId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub currency: CurrencyCode,
    #[schema(value_type = String)]
    pub subtotal_amount: Decimal,
    #[schema(value_type = String)]
    pub tax_amount: Decimal,
    #[schema(value_type = String)]
    pub deposit_amount: Decimal,
    /// Rental charges plus deposit.
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    /// Deposit projection, written only through the deposit reducer.
    pub deposit: DepositState,
    /// Payment method retained at checkout for later off-session use.
    pub saved_payment_method: Option<String>,
    /// Provider customer owning `saved_payment_method`.
    pub gateway_customer: Option<String>,
    /// Optimistic concurrency version, bumped by every write.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the booking flow when a reservation is created.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReservation {
    #[schema(example = "R-2025-0042")]
    pub number: String,
    pub store_id: StoreId,
    pub customer_id: CustomerId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub currency: CurrencyCode,
    #[schema(value_type = String, example = "180.00")]
    pub subtotal_amount: Decimal,
    #[schema(value_type = String, example = "20.00")]
    pub tax_amount: Decimal,
    #[schema(value_type = String, example = "100.00")]
    pub deposit_amount: Decimal,
}

impl NewReservation {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.number.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Reservation number cannot be empty".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(DomainError::ValidationError(
                "Reservation cannot end before it starts".into(),
            ));
        }
        for amount in [self.subtotal_amount, self.tax_amount, self.deposit_amount] {
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(DomainError::NegativeAmount);
            }
        }
        Ok(())
    }

    /// Builds the initial reservation (pending, no deposit activity).
    pub fn into_reservation(self) -> Result<Reservation, DomainError> {
        self.validate()?;
        let now = Utc::now();
        let total_amount = self.subtotal_amount + self.tax_amount + self.deposit_amount;
        Ok(Reservation {
            id: ReservationId::new(),
            number: self.number,
            status: ReservationStatus::Pending,
            store_id: self.store_id,
            customer_id: self.customer_id,
            start_date: self.start_date,
            end_date: self.end_date,
            currency: self.currency,
            subtotal_amount: self.subtotal_amount,
            tax_amount: self.tax_amount,
            deposit_amount: self.deposit_amount,
            total_amount,
            deposit: DepositState::default(),
            saved_payment_method: None,
            gateway_customer: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Reservation {
    pub fn deposit_status(&self) -> DepositStatus {
        self.deposit.status()
    }

    pub fn has_deposit(&self) -> bool {
        self.deposit_amount > Decimal::ZERO
    }

    /// The part of the total that pays for the rental itself.
    pub fn rental_portion(&self) -> Decimal {
        (self.total_amount - self.deposit_amount).max(Decimal::ZERO)
    }

    /// Rental amount not yet covered by completed rental payments.
    pub fn rental_balance(&self, ledger: &LedgerSummary) -> Decimal {
        (self.rental_portion() - ledger.rental_paid).max(Decimal::ZERO)
    }

    /// Computes the handover warnings from the ledger and deposit projection.
    pub fn warnings(&self, ledger: &LedgerSummary) -> Vec<TransitionWarning> {
        let mut warnings = Vec::new();

        if self.rental_balance(ledger) > Decimal::ZERO {
            warnings.push(TransitionWarning::PaymentIncomplete);
        }

        let deposit_held = matches!(
            self.deposit_status(),
            DepositStatus::Authorized | DepositStatus::Captured
        );
        let collected_offline = ledger.net_deposit_held() >= self.deposit_amount;
        if self.has_deposit() && !deposit_held && !collected_offline {
            warnings.push(TransitionWarning::DepositNotCollected);
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(deposit: i64) -> Reservation {
        NewReservation {
            number: "R-1".into(),
            store_id: StoreId::new(),
            customer_id: CustomerId::new(),
            start_date: Utc::now(),
            end_date: Utc::now() + chrono::Duration::days(2),
            currency: CurrencyCode::new("EUR").unwrap(),
            subtotal_amount: Decimal::from(180),
            tax_amount: Decimal::from(20),
            deposit_amount: Decimal::from(deposit),
        }
        .into_reservation()
        .unwrap()
    }

    #[test]
    fn test_new_reservation_totals() {
        let r = sample(100);
        assert_eq!(r.status, ReservationStatus::Pending);
        assert_eq!(r.total_amount, Decimal::from(300));
        assert_eq!(r.rental_portion(), Decimal::from(200));
        assert_eq!(r.deposit_status(), DepositStatus::None);
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let mut new = NewReservation {
            number: "R-1".into(),
            store_id: StoreId::new(),
            customer_id: CustomerId::new(),
            start_date: Utc::now(),
            end_date: Utc::now(),
            currency: CurrencyCode::new("EUR").unwrap(),
            subtotal_amount: Decimal::from(10),
            tax_amount: Decimal::ZERO,
            deposit_amount: Decimal::ZERO,
        };
        new.end_date = new.start_date - chrono::Duration::hours(1);
        assert!(new.into_reservation().is_err());
    }

    #[test]
    fn test_lifecycle_edges() {
        use ReservationAction as A;
        use ReservationStatus as S;

        assert_eq!(A::Confirm.target_from(S::Pending).unwrap(), S::Confirmed);
        assert_eq!(A::Pickup.target_from(S::Confirmed).unwrap(), S::Ongoing);
        assert_eq!(A::Return.target_from(S::Ongoing).unwrap(), S::Completed);
        assert_eq!(A::Cancel.target_from(S::Ongoing).unwrap(), S::Cancelled);
        assert!(A::Pickup.target_from(S::Pending).is_err());
        assert!(A::Reject.target_from(S::Confirmed).is_err());
        for terminal in [S::Completed, S::Cancelled, S::Rejected] {
            assert!(A::Cancel.target_from(terminal).is_err());
        }
    }

    #[test]
    fn test_unpaid_reservation_warns_on_both_counts() {
        let r = sample(100);
        let warnings = r.warnings(&LedgerSummary::default());
        assert_eq!(
            warnings,
            vec![
                TransitionWarning::PaymentIncomplete,
                TransitionWarning::DepositNotCollected
            ]
        );
    }

    #[test]
    fn test_paid_reservation_without_deposit_has_no_warnings() {
        let r = sample(0);
        let ledger = LedgerSummary {
            rental_paid: Decimal::from(200),
            ..Default::default()
        };
        assert!(r.warnings(&ledger).is_empty());
    }

    #[test]
    fn test_offline_deposit_counts_as_collected() {
        let r = sample(100);
        let ledger = LedgerSummary {
            rental_paid: Decimal::from(200),
            deposit_paid: Decimal::from(100),
            ..Default::default()
        };
        assert!(r.warnings(&ledger).is_empty());
    }
}
