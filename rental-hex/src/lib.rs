//! # Rental Hex
//!
//! Application service layer and HTTP adapter for the rental payment engine.
//!
//! ## Architecture
//!
//! - `service/` - Application services (checkout, deposits, webhooks, lifecycle)
//! - `sweeper` - Background reconciliation of expired holds
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The services are generic over `R: ReservationRepository` and
//! `G: GatewayFactory`, allowing different adapters to be injected.

pub mod inbound;
pub mod openapi;
pub mod service;
pub mod sweeper;


pub use service::{RentalService, ServiceSettings};
pub use sweeper::ExpirySweeper;
