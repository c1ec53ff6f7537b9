//! Payment ledger rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::money::CurrencyCode;
use super::reservation::ReservationId;
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for a Payment.
    PaymentId
);

/// What a payment row pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Rental,
    Deposit,
    DepositReturn,
    Damage,
}

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Through the payment provider.
    Gateway,
    Cash,
    Card,
    Transfer,
    Check,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

str_enum!(PaymentType {
    Rental => "rental",
    Deposit => "deposit",
    DepositReturn => "deposit_return",
    Damage => "damage",
});

str_enum!(PaymentMethod {
    Gateway => "gateway",
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
    Check => "check",
    Other => "other",
});

str_enum!(PaymentStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Refunded => "refunded",
});

/// A recorded payment.
///
/// Rows are append-only: reconciliation may update `status`, but the amount
/// and type never change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: PaymentId,
    pub reservation_id: ReservationId,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[schema(value_type = String, example = "60.00")]
    pub amount: Decimal,
    pub currency: CurrencyCode,
    /// Provider reference; the idempotency key when present.
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// A payment about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reservation_id: ReservationId,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub external_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl NewPayment {
    /// A completed payment recorded now.
    pub fn completed(
        reservation_id: ReservationId,
        payment_type: PaymentType,
        method: PaymentMethod,
        amount: Decimal,
        currency: CurrencyCode,
        external_reference: Option<String>,
    ) -> Result<Self, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::ValidationError(
                "Payment amount must be positive".into(),
            ));
        }
        Ok(Self {
            reservation_id,
            payment_type,
            method,
            status: PaymentStatus::Completed,
            amount,
            currency,
            external_reference,
            paid_at: Some(Utc::now()),
        })
    }

    /// Materializes the row with a fresh id.
    pub fn into_payment(self) -> Payment {
        Payment {
            id: PaymentId::new(),
            reservation_id: self.reservation_id,
            payment_type: self.payment_type,
            method: self.method,
            status: self.status,
            amount: self.amount,
            currency: self.currency,
            external_reference: self.external_reference,
            created_at: Utc::now(),
            paid_at: self.paid_at,
        }
    }
}

/// Sums of completed payments per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct LedgerSummary {
    #[schema(value_type = String)]
    pub rental_paid: Decimal,
    #[schema(value_type = String)]
    pub deposit_paid: Decimal,
    #[schema(value_type = String)]
    pub deposit_returned: Decimal,
    #[schema(value_type = String)]
    pub damage_paid: Decimal,
}

impl LedgerSummary {
    pub fn from_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Self {
        payments
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .fold(Self::default(), |mut acc, p| {
                match p.payment_type {
                    PaymentType::Rental => acc.rental_paid += p.amount,
                    PaymentType::Deposit => acc.deposit_paid += p.amount,
                    PaymentType::DepositReturn => acc.deposit_returned += p.amount,
                    PaymentType::Damage => acc.damage_paid += p.amount,
                }
                acc
            })
    }

    /// Deposit money currently held by the store.
    pub fn net_deposit_held(&self) -> Decimal {
        self.deposit_paid - self.deposit_returned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(payment_type: PaymentType, status: PaymentStatus, amount: i64) -> Payment {
        let mut p = NewPayment::completed(
            ReservationId::new(),
            payment_type,
            PaymentMethod::Cash,
            Decimal::from(amount),
            CurrencyCode::new("EUR").unwrap(),
            None,
        )
        .unwrap()
        .into_payment();
        p.status = status;
        p
    }

    #[test]
    fn test_summary_counts_completed_rows_only() {
        let rows = vec![
            payment(PaymentType::Rental, PaymentStatus::Completed, 120),
            payment(PaymentType::Rental, PaymentStatus::Failed, 80),
            payment(PaymentType::Deposit, PaymentStatus::Completed, 60),
            payment(PaymentType::DepositReturn, PaymentStatus::Completed, 20),
            payment(PaymentType::Damage, PaymentStatus::Refunded, 15),
        ];
        let summary = LedgerSummary::from_payments(&rows);
        assert_eq!(summary.rental_paid, Decimal::from(120));
        assert_eq!(summary.net_deposit_held(), Decimal::from(40));
        assert_eq!(summary.damage_paid, Decimal::ZERO);
    }

    #[test]
    fn test_non_positive_payment_is_rejected() {
        let result = NewPayment::completed(
            ReservationId::new(),
            PaymentType::Rental,
            PaymentMethod::Cash,
            Decimal::ZERO,
            CurrencyCode::new("EUR").unwrap(),
            None,
        );
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!(PaymentType::DepositReturn.to_string(), "deposit_return");
        assert_eq!(
            "transfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::Transfer
        );
        assert!("wire".parse::<PaymentMethod>().is_err());
    }
}
