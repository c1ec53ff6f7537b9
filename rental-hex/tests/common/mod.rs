//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, Response},
};
use http_body_util::BodyExt;
use rental_gateway::{StripeConfig, StripeGatewayFactory};
use rental_hex::{RentalService, ServiceSettings, inbound::HttpServer};
use rental_repo::sqlite::SqliteRepo;

pub const API_KEY: &str = "sk_staff_test";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Server backed by in-memory SQLite and a provider endpoint nobody listens on.
pub async fn create_test_server(requests_per_minute: u32) -> HttpServer<SqliteRepo, StripeGatewayFactory> {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let gateways = StripeGatewayFactory::new(
        StripeConfig::new("http://127.0.0.1:9", "sk_test_unused")
            .with_timeout(std::time::Duration::from_millis(200)),
    )
    .unwrap();
    let service = RentalService::new(
        repo,
        gateways,
        ServiceSettings::new("https://rent.example/", WEBHOOK_SECRET),
    );
    HttpServer::with_rate_limit(service, API_KEY, requests_per_minute)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {}", API_KEY))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", API_KEY))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn new_reservation() -> serde_json::Value {
    let start = chrono::Utc::now() + chrono::Duration::days(2);
    let end = start + chrono::Duration::days(3);
    serde_json::json!({
        "number": "R-2025-0042",
        "store_id": uuid::Uuid::new_v4(),
        "customer_id": uuid::Uuid::new_v4(),
        "start_date": start,
        "end_date": end,
        "currency": "EUR",
        "subtotal_amount": "180.00",
        "tax_amount": "20.00",
        "deposit_amount": "100.00"
    })
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
