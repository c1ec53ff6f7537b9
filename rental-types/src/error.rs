//! Error types for the rental payment engine.

use rust_decimal::Decimal;

use crate::domain::{CurrencyCode, TransitionWarning};
use crate::ports::GatewayError;

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount is out of range for the provider")]
    AmountOutOfRange,

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        got: CurrencyCode,
    },

    #[error("Cannot {action} while {state}")]
    InvalidState { action: String, state: String },

    #[error("Amount {requested} exceeds the authorized amount {authorized}")]
    AmountExceedsAuthorization {
        requested: Decimal,
        authorized: Decimal,
    },

    #[error("Store has not connected a payment account")]
    StoreNotOnboarded,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors returned to callers.
///
/// Business-rule outcomes carry a stable [`AppError::code`]; infrastructure
/// failures are reported as retry-later conditions.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Amount {requested} exceeds the authorized amount {authorized}")]
    AmountExceedsAuthorization {
        requested: Decimal,
        authorized: Decimal,
    },

    #[error("Transition requires acknowledgement of: {}", format_warnings(.0))]
    AcknowledgementRequired(Vec<TransitionWarning>),

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Payment provider rejected the request: {message}")]
    ProviderRejected {
        code: Option<String>,
        message: String,
    },

    #[error("Webhook signature invalid")]
    SignatureInvalid,

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_warnings(warnings: &[TransitionWarning]) -> String {
    warnings
        .iter()
        .map(|w| w.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    /// Stable error code for localized display.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::AmountExceedsAuthorization { .. } => "AMOUNT_EXCEEDS_AUTHORIZATION",
            AppError::AcknowledgementRequired(_) => "ACKNOWLEDGEMENT_REQUIRED",
            AppError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AppError::ProviderRejected { .. } => "PROVIDER_REJECTED",
            AppError::SignatureInvalid => "SIGNATURE_INVALID",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the same request may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable(_) | AppError::Conflict(_) | AppError::Internal(_)
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidState { .. } => AppError::InvalidState(err.to_string()),
            DomainError::AmountExceedsAuthorization {
                requested,
                authorized,
            } => AppError::AmountExceedsAuthorization {
                requested,
                authorized,
            },
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(msg) => AppError::ProviderUnavailable(msg),
            GatewayError::Rejected { code, message } => AppError::ProviderRejected { code, message },
            GatewayError::SignatureInvalid(_) => AppError::SignatureInvalid,
            GatewayError::InvalidPayload(msg) => AppError::Validation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_business_codes() {
        let err: AppError = DomainError::InvalidState {
            action: "capture".into(),
            state: "released".into(),
        }
        .into();
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(!err.is_retryable());

        let err: AppError = DomainError::StoreNotOnboarded.into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_gateway_errors_map_to_taxonomy() {
        let err: AppError = GatewayError::Unavailable("timeout".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");

        let err: AppError = GatewayError::Rejected {
            code: Some("card_declined".into()),
            message: "Your card was declined.".into(),
        }
        .into();
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "PROVIDER_REJECTED");
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err: AppError = RepoError::Conflict("version changed".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_acknowledgement_message_lists_warnings() {
        let err = AppError::AcknowledgementRequired(vec![
            TransitionWarning::PaymentIncomplete,
            TransitionWarning::DepositNotCollected,
        ]);
        assert_eq!(
            err.to_string(),
            "Transition requires acknowledgement of: PAYMENT_INCOMPLETE, DEPOSIT_NOT_COLLECTED"
        );
    }
}
