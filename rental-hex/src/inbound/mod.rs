//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

pub mod auth;
pub mod handlers;
pub mod rate_limit;
mod server;

pub use handlers::{ACTOR_HEADER, SIGNATURE_HEADER};
pub use server::HttpServer;
