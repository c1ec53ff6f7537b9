//! Domain models for the rental payment engine.

/// Declares a UUID-backed identifier newtype.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            serde::Serialize,
            serde::Deserialize,
            utoipa::ToSchema,
        )]
        #[serde(transparent)]
        #[schema(value_type = String, format = Uuid)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            pub fn into_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

/// Implements text conversions for a fieldless enum.
macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = crate::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::DomainError::ValidationError(format!(
                        concat!("Unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod audit;
pub mod deposit;
pub mod events;
pub mod money;
pub mod payment;
pub mod provider;
pub mod reservation;
pub mod store;

pub use audit::AuditEntry;
pub use deposit::{
    AUTHORIZATION_HOLD_DAYS, DepositEvent, DepositState, DepositStatus, Reduction, reduce,
};
pub use events::DomainEvent;
pub use money::{CurrencyCode, Money, from_minor_units, to_minor_units};
pub use payment::{
    LedgerSummary, NewPayment, Payment, PaymentId, PaymentMethod, PaymentStatus, PaymentType,
};
pub use provider::{
    AccountEvent, ChargeEvent, ChargeRefunded, CheckoutSession, CheckoutSessionEvent,
    IntentStatus, PaymentIntent, PaymentIntentEvent, ProviderEvent, ProviderEventKind, Refund,
    SetupIntent, SetupIntentEvent, SubAccountStatus,
};
pub use reservation::{
    CustomerId, NewReservation, Reservation, ReservationAction, ReservationId, ReservationStatus,
    TransitionWarning,
};
pub use store::{StoreAccount, StoreId};
