//! End-to-end tests of the HTTP surface over in-memory SQLite.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use common::{
    WEBHOOK_SECRET, create_test_server, get, json_body, new_reservation, post_json,
};

fn webhook(payload: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/webhooks/provider")
        .header("Content-Type", "application/json")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn unknown_event(id: &str) -> String {
    json!({
        "id": id,
        "type": "invoice.paid",
        "created": Utc::now().timestamp(),
        "account": null,
        "data": { "object": { "id": "in_1" } }
    })
    .to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_server(100).await.router();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_api_requires_key() {
    let app = create_test_server(100).await.router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/reservations")
        .header("Content-Type", "application/json")
        .body(Body::from(new_reservation().to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error_code"], "UNAUTHORIZED");

    let request = Request::builder()
        .uri("/api/stores/00000000-0000-0000-0000-000000000001")
        .header("Authorization", "Bearer wrong-key")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_fetch_reservation() {
    let app = create_test_server(100).await.router();

    let response = app
        .clone()
        .oneshot(post_json("/api/reservations", new_reservation()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["status"], "pending");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/reservations/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let details = json_body(response).await;
    assert_eq!(details["data"]["reservation"]["id"], id.as_str());
    assert_eq!(details["data"]["payments"], json!([]));

    let response = app
        .oneshot(get(&format!("/api/reservations/{id}/audit")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_reservation_is_404() {
    let app = create_test_server(100).await.router();
    let response = app
        .oneshot(get(&format!("/api/reservations/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_id_is_400() {
    let app = create_test_server(100).await.router();
    let response = app
        .oneshot(get("/api/reservations/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pickup_requires_acknowledged_warnings() {
    let app = create_test_server(100).await.router();

    let created = json_body(
        app.clone()
            .oneshot(post_json("/api/reservations", new_reservation()))
            .await
            .unwrap(),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    let transitions = format!("/api/reservations/{id}/transitions");

    let response = app
        .clone()
        .oneshot(post_json(&transitions, json!({ "action": "confirm" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json(&transitions, json!({ "action": "pickup" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(response).await;
    assert_eq!(
        json["warnings"],
        json!(["PAYMENT_INCOMPLETE", "DEPOSIT_NOT_COLLECTED"])
    );

    let response = app
        .clone()
        .oneshot(post_json(
            &transitions,
            json!({ "action": "pickup", "acknowledge_warnings": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["reservation"]["status"], "ongoing");

    // Ongoing reservations cannot be confirmed again.
    let response = app
        .oneshot(post_json(&transitions, json!({ "action": "confirm" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let app = create_test_server(100).await.router();
    let payload = unknown_event("evt_bad");

    let response = app
        .oneshot(webhook(&payload, "t=1,v1=deadbeef"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_acknowledges_unknown_event_once() {
    let app = create_test_server(100).await.router();
    let payload = unknown_event("evt_unknown");
    let signature =
        rental_gateway::signature::sign(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp())
            .unwrap();

    let response = app
        .clone()
        .oneshot(webhook(&payload, &signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "ignored");

    let response = app.oneshot(webhook(&payload, &signature)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["outcome"], "duplicate");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_test_server(100).await.router();
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["paths"]["/webhooks/provider"].is_object());
}
