//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use rental_types::domain::{
    AuditEntry, DepositState, DepositStatus, LedgerSummary, NewReservation, Payment,
    PaymentMethod, PaymentStatus, PaymentType, Reservation, ReservationAction, ReservationStatus,
    StoreAccount, TransitionWarning,
};
use rental_types::dto::{
    AuditResponse, AuthorizationMode, AuthorizeDepositRequest, AuthorizeDepositResponse,
    CancelSideEffect, CaptureDepositRequest, CheckoutKind, CheckoutRequest, CheckoutResponse,
    ConnectStoreRequest, ErrorResponse, LineItemRequest, OnboardingLinkRequest,
    OnboardingLinkResponse, RecordPaymentRequest, ReservationDetails, ReturnDepositRequest,
    TransitionRequest, TransitionResponse, WarningsResponse,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Create a reservation
#[utoipa::path(
    post,
    path = "/api/reservations",
    tag = "reservations",
    request_body = NewReservation,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Reservation created", body = Reservation),
        (status = 400, description = "Invalid amounts or dates", body = ErrorResponse),
        (status = 401, description = "Unauthorized")
    )
)]
async fn create_reservation() {}

/// Reservation with its payments and ledger
#[utoipa::path(
    get,
    path = "/api/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 404, description = "Reservation not found", body = ErrorResponse)
    )
)]
async fn get_reservation() {}

/// Warnings a transition would raise right now
#[utoipa::path(
    get,
    path = "/api/reservations/{id}/warnings",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Outstanding warnings", body = WarningsResponse),
        (status = 404, description = "Reservation not found", body = ErrorResponse)
    )
)]
async fn warnings() {}

/// Audit trail of a reservation
#[utoipa::path(
    get,
    path = "/api/reservations/{id}/audit",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = AuditResponse)
    )
)]
async fn audit() {}

/// Apply a lifecycle action
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/transitions",
    tag = "reservations",
    request_body = TransitionRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Transition applied", body = TransitionResponse),
        (status = 409, description = "Action not allowed from the current status", body = ErrorResponse),
        (status = 422, description = "Warnings must be acknowledged", body = ErrorResponse)
    )
)]
async fn transition() {}

/// Payments recorded against a reservation
#[utoipa::path(
    get,
    path = "/api/reservations/{id}/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Payments, oldest first", body = Vec<Payment>)
    )
)]
async fn list_payments() {}

/// Record a payment taken outside the provider
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/payments",
    tag = "payments",
    request_body = RecordPaymentRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 201, description = "Payment recorded", body = Payment),
        (status = 400, description = "Invalid amount or method", body = ErrorResponse)
    )
)]
async fn record_payment() {}

/// Create a hosted checkout session
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/checkout",
    tag = "payments",
    request_body = CheckoutRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutResponse),
        (status = 409, description = "Store cannot accept charges", body = ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = ErrorResponse)
    )
)]
async fn create_checkout() {}

/// Request a deposit authorization
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/deposit/authorize",
    tag = "deposit",
    request_body = AuthorizeDepositRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Authorization requested", body = AuthorizeDepositResponse),
        (status = 402, description = "Card declined", body = ErrorResponse),
        (status = 409, description = "Deposit already held", body = ErrorResponse)
    )
)]
async fn authorize_deposit() {}

/// Capture all or part of the held deposit
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/deposit/capture",
    tag = "deposit",
    request_body = CaptureDepositRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Deposit captured", body = Reservation),
        (status = 409, description = "No authorized hold", body = ErrorResponse),
        (status = 422, description = "Amount exceeds the authorization", body = ErrorResponse)
    )
)]
async fn capture_deposit() {}

/// Release the held deposit
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/deposit/release",
    tag = "deposit",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 200, description = "Deposit released", body = Reservation),
        (status = 409, description = "Nothing to release", body = ErrorResponse)
    )
)]
async fn release_deposit() {}

/// Return a captured deposit
#[utoipa::path(
    post,
    path = "/api/reservations/{id}/deposit/return",
    tag = "deposit",
    request_body = ReturnDepositRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation ID (UUID)")),
    responses(
        (status = 201, description = "Deposit return recorded", body = Payment),
        (status = 422, description = "Amount exceeds what was collected", body = ErrorResponse)
    )
)]
async fn return_deposit() {}

/// Store payment account
#[utoipa::path(
    get,
    path = "/api/stores/{id}",
    tag = "stores",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Store account", body = StoreAccount),
        (status = 404, description = "Store not connected", body = ErrorResponse)
    )
)]
async fn get_store() {}

/// Create the store's sub-account
#[utoipa::path(
    post,
    path = "/api/stores/{id}/connect",
    tag = "stores",
    request_body = ConnectStoreRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Store connected", body = StoreAccount)
    )
)]
async fn connect_store() {}

/// Hosted onboarding link
#[utoipa::path(
    post,
    path = "/api/stores/{id}/onboarding-link",
    tag = "stores",
    request_body = OnboardingLinkRequest,
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Onboarding link", body = OnboardingLinkResponse)
    )
)]
async fn onboarding_link() {}

/// Refresh capability flags from the provider
#[utoipa::path(
    post,
    path = "/api/stores/{id}/refresh",
    tag = "stores",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Store ID (UUID)")),
    responses(
        (status = 200, description = "Store account", body = StoreAccount)
    )
)]
async fn refresh_store() {}

/// Provider webhook intake
#[utoipa::path(
    post,
    path = "/webhooks/provider",
    tag = "webhooks",
    request_body(content = String, description = "Raw provider event"),
    params(("Stripe-Signature" = String, Header, description = "Provider signature")),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 400, description = "Signature rejected"),
        (status = 503, description = "Transient failure, redeliver")
    )
)]
async fn provider_webhook() {}

/// OpenAPI documentation for the rental payment API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rental Payment Engine API",
        version = "1.0.0",
        description = "Reservation payments, deposit authorizations and store onboarding for a rental marketplace.\n\n## Authentication\n\nStaff endpoints require the configured API key in the `Authorization` header:\n\n```\nAuthorization: Bearer <api_key>\n```\n\nThe provider webhook is authenticated by its signature.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_reservation,
        get_reservation,
        warnings,
        audit,
        transition,
        list_payments,
        record_payment,
        create_checkout,
        authorize_deposit,
        capture_deposit,
        release_deposit,
        return_deposit,
        get_store,
        connect_store,
        onboarding_link,
        refresh_store,
        provider_webhook,
    ),
    components(
        schemas(
            NewReservation,
            Reservation,
            ReservationStatus,
            ReservationAction,
            TransitionWarning,
            DepositState,
            DepositStatus,
            Payment,
            PaymentType,
            PaymentMethod,
            PaymentStatus,
            LedgerSummary,
            AuditEntry,
            StoreAccount,
            ErrorResponse,
            TransitionRequest,
            TransitionResponse,
            CancelSideEffect,
            WarningsResponse,
            ReservationDetails,
            AuditResponse,
            CheckoutKind,
            LineItemRequest,
            CheckoutRequest,
            CheckoutResponse,
            RecordPaymentRequest,
            AuthorizationMode,
            AuthorizeDepositRequest,
            AuthorizeDepositResponse,
            CaptureDepositRequest,
            ReturnDepositRequest,
            ConnectStoreRequest,
            OnboardingLinkRequest,
            OnboardingLinkResponse,
        )
    ),

    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "reservations", description = "Reservation lifecycle"),
        (name = "payments", description = "Checkout sessions and recorded payments"),
        (name = "deposit", description = "Security deposit authorization"),
        (name = "stores", description = "Store sub-account onboarding"),
        (name = "webhooks", description = "Provider event intake"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for Bearer token authentication.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
