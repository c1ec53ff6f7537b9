//! # Rental Gateway
//!
//! Outbound adapter for a Stripe-compatible card-payment provider.
//!
//! - `client` - REST client implementing [`PaymentGateway`](rental_types::PaymentGateway),
//!   one instance per account (platform or store sub-account)
//! - `wire` - provider JSON shapes and their translation into port types
//! - `signature` - webhook signature verification
//!
//! Provider error codes never leave this crate: every failure is mapped to
//! [`GatewayError`](rental_types::GatewayError).

mod client;
pub mod signature;
mod wire;

pub use client::{StripeConfig, StripeGateway, StripeGatewayFactory};
pub use wire::parse_event;
