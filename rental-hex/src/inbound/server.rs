//! HTTP Server configuration and startup.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rental_types::{GatewayFactory, ReservationRepository};

use super::auth::auth_middleware;
use super::handlers::{self, AppState};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::RentalService;
use crate::openapi::ApiDoc;

/// HTTP Server for the rental payment API.
pub struct HttpServer<R, G> {
    state: Arc<AppState<R, G>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: ReservationRepository, G: GatewayFactory> HttpServer<R, G> {
    /// Creates a new HTTP server guarded by `api_key`.
    pub fn new(service: RentalService<R, G>, api_key: &str) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                api_key_hash: rental_repo::security::hash_api_key(api_key),
            }),
            rate_limiter: Arc::new(RateLimiterState::default()), // 100 req/min default
        }
    }

    /// Creates a new HTTP server with custom rate limiting.
    pub fn with_rate_limit(
        service: RentalService<R, G>,
        api_key: &str,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiterState::new(
                requests_per_minute,
                Duration::from_secs(60),
            )),
            ..Self::new(service, api_key)
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let api = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/reservations",
                post(handlers::create_reservation::<R, G>),
            )
            .route(
                "/api/reservations/{id}",
                get(handlers::get_reservation::<R, G>),
            )
            .route(
                "/api/reservations/{id}/payments",
                get(handlers::list_payments::<R, G>).post(handlers::record_payment::<R, G>),
            )
            .route(
                "/api/reservations/{id}/warnings",
                get(handlers::warnings::<R, G>),
            )
            .route("/api/reservations/{id}/audit", get(handlers::audit::<R, G>))
            .route(
                "/api/reservations/{id}/transitions",
                post(handlers::transition::<R, G>),
            )
            .route(
                "/api/reservations/{id}/checkout",
                post(handlers::create_checkout::<R, G>),
            )
            .route(
                "/api/reservations/{id}/deposit/authorize",
                post(handlers::authorize_deposit::<R, G>),
            )
            .route(
                "/api/reservations/{id}/deposit/capture",
                post(handlers::capture_deposit::<R, G>),
            )
            .route(
                "/api/reservations/{id}/deposit/release",
                post(handlers::release_deposit::<R, G>),
            )
            .route(
                "/api/reservations/{id}/deposit/return",
                post(handlers::return_deposit::<R, G>),
            )
            .route("/api/stores/{id}", get(handlers::get_store::<R, G>))
            .route(
                "/api/stores/{id}/connect",
                post(handlers::connect_store::<R, G>),
            )
            .route(
                "/api/stores/{id}/onboarding-link",
                post(handlers::onboarding_link::<R, G>),
            )
            .route(
                "/api/stores/{id}/refresh",
                post(handlers::refresh_store::<R, G>),
            )
            .route(
                "/webhooks/provider",
                post(handlers::provider_webhook::<R, G>),
            )
            .with_state(self.state.clone());

        Router::new()
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .merge(api)
            .layer(metrics)
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R, G>,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
