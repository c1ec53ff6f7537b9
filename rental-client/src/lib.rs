//! # Rental Client SDK
//!
//! A typed Rust client for the rental payment API. Every call unwraps the
//! `{ success, data }` envelope; failures surface the server's error code.

use rental_types::domain::{
    NewReservation, Payment, PaymentMethod, ReservationAction, StoreAccount, TransitionWarning,
};
use rental_types::{
    ApiResponse, AuditResponse, AuthorizationMode, AuthorizeDepositRequest,
    AuthorizeDepositResponse, CaptureDepositRequest, CheckoutRequest, CheckoutResponse,
    ConnectStoreRequest, ErrorResponse, OnboardingLinkRequest, OnboardingLinkResponse,
    RecordPaymentRequest, Reservation, ReservationDetails, ReservationId, ReturnDepositRequest,
    StoreId, TransitionRequest, TransitionResponse, WarningsResponse,
};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        warnings: Vec<TransitionWarning>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rental payment API client.
pub struct RentalClient {
    base_url: String,
    api_key: Option<String>,
    actor: Option<String>,
    http: Client,
}

impl RentalClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            actor: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Names the staff member recorded in the audit trail.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // Reservations

    pub async fn create_reservation(
        &self,
        req: &NewReservation,
    ) -> Result<Reservation, ClientError> {
        self.post("/api/reservations", req).await
    }

    pub async fn get_reservation(
        &self,
        id: ReservationId,
    ) -> Result<ReservationDetails, ClientError> {
        self.get(&format!("/api/reservations/{}", id)).await
    }

    pub async fn list_payments(&self, id: ReservationId) -> Result<Vec<Payment>, ClientError> {
        self.get(&format!("/api/reservations/{}/payments", id)).await
    }

    pub async fn warnings(&self, id: ReservationId) -> Result<WarningsResponse, ClientError> {
        self.get(&format!("/api/reservations/{}/warnings", id)).await
    }

    pub async fn audit(&self, id: ReservationId) -> Result<AuditResponse, ClientError> {
        self.get(&format!("/api/reservations/{}/audit", id)).await
    }

    /// Applies a lifecycle action.
    ///
    /// Pickup and return fail with `ACKNOWLEDGEMENT_REQUIRED` until
    /// `acknowledge_warnings` is set; the pending warnings are in the error.
    pub async fn transition(
        &self,
        id: ReservationId,
        action: ReservationAction,
        acknowledge_warnings: bool,
    ) -> Result<TransitionResponse, ClientError> {
        let req = TransitionRequest {
            action,
            acknowledge_warnings,
            actor: self.actor.clone(),
        };
        self.post(&format!("/api/reservations/{}/transitions", id), &req)
            .await
    }

    // Payments

    pub async fn create_checkout(
        &self,
        id: ReservationId,
        req: &CheckoutRequest,
    ) -> Result<CheckoutResponse, ClientError> {
        self.post(&format!("/api/reservations/{}/checkout", id), req)
            .await
    }

    pub async fn record_payment(
        &self,
        id: ReservationId,
        req: &RecordPaymentRequest,
    ) -> Result<Payment, ClientError> {
        self.post(&format!("/api/reservations/{}/payments", id), req)
            .await
    }

    // Deposit

    pub async fn authorize_deposit(
        &self,
        id: ReservationId,
        mode: AuthorizationMode,
        amount: Option<Decimal>,
    ) -> Result<AuthorizeDepositResponse, ClientError> {
        let req = AuthorizeDepositRequest { mode, amount };
        self.post(&format!("/api/reservations/{}/deposit/authorize", id), &req)
            .await
    }

    pub async fn capture_deposit(
        &self,
        id: ReservationId,
        amount: Option<Decimal>,
    ) -> Result<Reservation, ClientError> {
        let req = CaptureDepositRequest { amount };
        self.post(&format!("/api/reservations/{}/deposit/capture", id), &req)
            .await
    }

    pub async fn release_deposit(&self, id: ReservationId) -> Result<Reservation, ClientError> {
        self.post(
            &format!("/api/reservations/{}/deposit/release", id),
            &serde_json::json!({}),
        )
        .await
    }

    pub async fn return_deposit(
        &self,
        id: ReservationId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Payment, ClientError> {
        let req = ReturnDepositRequest { amount, method };
        self.post(&format!("/api/reservations/{}/deposit/return", id), &req)
            .await
    }

    // Stores

    pub async fn get_store(&self, id: StoreId) -> Result<StoreAccount, ClientError> {
        self.get(&format!("/api/stores/{}", id)).await
    }

    pub async fn connect_store(
        &self,
        id: StoreId,
        email: &str,
        country: &str,
    ) -> Result<StoreAccount, ClientError> {
        let req = ConnectStoreRequest {
            email: email.to_string(),
            country: country.to_string(),
        };
        self.post(&format!("/api/stores/{}/connect", id), &req).await
    }

    pub async fn onboarding_link(
        &self,
        id: StoreId,
        return_url: &str,
        refresh_url: &str,
    ) -> Result<String, ClientError> {
        let req = OnboardingLinkRequest {
            return_url: return_url.to_string(),
            refresh_url: refresh_url.to_string(),
        };
        let link: OnboardingLinkResponse = self
            .post(&format!("/api/stores/{}/onboarding-link", id), &req)
            .await?;
        Ok(link.url)
    }

    pub async fn refresh_store(&self, id: StoreId) -> Result<StoreAccount, ClientError> {
        self.post(&format!("/api/stores/{}/refresh", id), &serde_json::json!({}))
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        let resp = self.authorize(req).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        let resp = self.authorize(req).send().await?;
        self.handle_response(resp).await
    }

    fn authorize(&self, mut req: RequestBuilder) -> RequestBuilder {
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(actor) = &self.actor {
            req = req.header("X-Actor", actor);
        }
        req
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            let envelope: ApiResponse<T> = serde_json::from_str(&body)?;
            Ok(envelope.data)
        } else {
            Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => ClientError::Api {
                    status: status.as_u16(),
                    code: err.error_code,
                    message: err.error,
                    warnings: err.warnings,
                },
                Err(_) => ClientError::Api {
                    status: status.as_u16(),
                    code: String::new(),
                    message: body,
                    warnings: Vec::new(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_client_creation() {
        let client = RentalClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = RentalClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = RentalClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    #[tokio::test]
    async fn test_envelope_is_unwrapped_and_key_sent() {
        let app = Router::new().route(
            "/api/stores/{id}/onboarding-link",
            post(|headers: HeaderMap| async move {
                let auth = headers
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({ "success": true, "data": { "url": auth } }))
            }),
        );
        let base = spawn(app).await;

        let client = RentalClient::new(base).with_api_key("sk_staff");
        let url = client
            .onboarding_link(StoreId::new(), "https://a/", "https://b/")
            .await
            .unwrap();
        assert_eq!(url, "Bearer sk_staff");
    }

    #[tokio::test]
    async fn test_error_envelope_carries_warnings() {
        let app = Router::new().route(
            "/api/reservations/{id}/warnings",
            get(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "success": false,
                        "error_code": "ACKNOWLEDGEMENT_REQUIRED",
                        "error": "Warnings must be acknowledged",
                        "warnings": ["PAYMENT_INCOMPLETE"]
                    })),
                )
            }),
        );
        let base = spawn(app).await;

        let err = RentalClient::new(base)
            .warnings(ReservationId::new())
            .await
            .unwrap_err();
        match err {
            ClientError::Api {
                status,
                code,
                warnings,
                ..
            } => {
                assert_eq!(status, 422);
                assert_eq!(code, "ACKNOWLEDGEMENT_REQUIRED");
                assert_eq!(warnings, vec![TransitionWarning::PaymentIncomplete]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
