//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod gateway;
mod repository;

pub use gateway::{
    CheckoutLineItem, CreateCheckoutSession, CreatePaymentIntent, CreateRefund, CreateSetupIntent,
    CreateSubAccount, GatewayError, GatewayFactory, PaymentGateway, RefundReason,
};
pub use repository::{PaymentRecord, ReservationRepository, SavedReservation};
