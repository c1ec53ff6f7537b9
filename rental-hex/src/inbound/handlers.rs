//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use rental_types::domain::NewReservation;
use rental_types::{
    ApiResponse, AppError, AuthorizeDepositRequest, CaptureDepositRequest, CheckoutRequest,
    ConnectStoreRequest, ErrorResponse, GatewayFactory, OnboardingLinkRequest,
    OnboardingLinkResponse, RecordPaymentRequest, ReservationId, ReservationRepository,
    ReturnDepositRequest, StoreId, TransitionRequest,
};

use crate::RentalService;

/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Header naming the staff member behind a request, for the audit trail.
pub const ACTOR_HEADER: &str = "X-Actor";

/// Application state shared across handlers.
pub struct AppState<R, G> {
    pub service: RentalService<R, G>,
    /// SHA-256 hex digest of the staff API key.
    pub api_key_hash: String,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

fn status_of(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidState(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::AmountExceedsAuthorization { .. } | AppError::AcknowledgementRequired(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AppError::ProviderRejected { .. } => StatusCode::PAYMENT_REQUIRED,
        AppError::SignatureInvalid => StatusCode::UNAUTHORIZED,
        AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        let error_code = self.0.code().to_string();
        let error = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                "Something went wrong on our side, please retry later".to_string()
            }
            other => other.to_string(),
        };
        let warnings = match self.0 {
            AppError::AcknowledgementRequired(warnings) => warnings,
            _ => Vec::new(),
        };

        let body = ErrorResponse {
            success: false,
            error_code,
            error,
            warnings,
        };
        (status, Json(body)).into_response()
    }
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data))
}

fn parse_reservation_id(id: &str) -> Result<ReservationId, AppError> {
    id.parse()
        .map_err(|_| AppError::Validation("Invalid reservation ID".into()))
}

fn parse_store_id(id: &str) -> Result<StoreId, AppError> {
    id.parse()
        .map_err(|_| AppError::Validation("Invalid store ID".into()))
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("staff")
        .to_string()
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Reservations
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(number = %req.number))]
pub async fn create_reservation<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Json(req): Json<NewReservation>,
) -> Result<impl IntoResponse, ApiError> {
    let reservation = state.service.lifecycle().create(req).await?;
    Ok((StatusCode::CREATED, ok(reservation)))
}

#[tracing::instrument(skip(state), fields(reservation_id = %id))]
pub async fn get_reservation<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    Ok(ok(state.service.lifecycle().get(id).await?))
}

#[tracing::instrument(skip(state), fields(reservation_id = %id))]
pub async fn list_payments<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    Ok(ok(state.service.lifecycle().get(id).await?.payments))
}

#[tracing::instrument(skip(state), fields(reservation_id = %id))]
pub async fn warnings<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    Ok(ok(state.service.lifecycle().warnings(id).await?))
}

#[tracing::instrument(skip(state), fields(reservation_id = %id))]
pub async fn audit<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    Ok(ok(state.service.lifecycle().audit_trail(id).await?))
}

#[tracing::instrument(skip(state, headers, req), fields(reservation_id = %id, action = %req.action))]
pub async fn transition<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(mut req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    if req.actor.is_none() {
        req.actor = Some(actor(&headers));
    }
    Ok(ok(state.service.lifecycle().transition(id, req).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payments
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, req), fields(reservation_id = %id))]
pub async fn create_checkout<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let session = state.service.checkout().create_checkout(id, req).await?;
    Ok((StatusCode::CREATED, ok(session)))
}

#[tracing::instrument(skip(state, headers, req), fields(reservation_id = %id))]
pub async fn record_payment<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let payment = state
        .service
        .checkout()
        .record_offline_payment(id, req, &actor(&headers))
        .await?;
    Ok((StatusCode::CREATED, ok(payment)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Deposit
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, headers, req), fields(reservation_id = %id))]
pub async fn authorize_deposit<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let response = state
        .service
        .deposits()
        .request_authorization(id, req, &actor(&headers))
        .await?;
    Ok(ok(response))
}

#[tracing::instrument(skip(state, headers, req), fields(reservation_id = %id))]
pub async fn capture_deposit<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CaptureDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let reservation = state
        .service
        .deposits()
        .capture(id, req, &actor(&headers))
        .await?;
    Ok(ok(reservation))
}

#[tracing::instrument(skip(state, headers), fields(reservation_id = %id))]
pub async fn release_deposit<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let reservation = state
        .service
        .deposits()
        .release(id, &actor(&headers))
        .await?;
    Ok(ok(reservation))
}

#[tracing::instrument(skip(state, headers, req), fields(reservation_id = %id))]
pub async fn return_deposit<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReturnDepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reservation_id(&id)?;
    let payment = state
        .service
        .deposits()
        .return_deposit(id, req, &actor(&headers))
        .await?;
    Ok((StatusCode::CREATED, ok(payment)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state), fields(store_id = %id))]
pub async fn get_store<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_store_id(&id)?;
    Ok(ok(state.service.stores().get(id).await?))
}

#[tracing::instrument(skip(state, req), fields(store_id = %id))]
pub async fn connect_store<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    Json(req): Json<ConnectStoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_store_id(&id)?;
    Ok(ok(state.service.stores().connect(id, req).await?))
}

#[tracing::instrument(skip(state, req), fields(store_id = %id))]
pub async fn onboarding_link<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
    Json(req): Json<OnboardingLinkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_store_id(&id)?;
    let url = state.service.stores().onboarding_link(id, req).await?;
    Ok(ok(OnboardingLinkResponse { url }))
}

#[tracing::instrument(skip(state), fields(store_id = %id))]
pub async fn refresh_store<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_store_id(&id)?;
    Ok(ok(state.service.stores().refresh_status(id).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider webhooks
// ─────────────────────────────────────────────────────────────────────────────

/// Provider webhook endpoint.
///
/// 200 acknowledges (including events that were dropped or ignored), 400
/// rejects a bad signature, 503 asks the provider to redeliver.
#[tracing::instrument(skip_all)]
pub async fn provider_webhook<R: ReservationRepository, G: GatewayFactory>(
    State(state): State<Arc<AppState<R, G>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.service.webhooks().handle(&body, signature).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "outcome": outcome.as_str() })),
        )
            .into_response(),
        Err(AppError::SignatureInvalid) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "received": false, "error": "invalid signature" })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "received": false, "error_code": e.code() })),
        )
            .into_response(),
    }
}
