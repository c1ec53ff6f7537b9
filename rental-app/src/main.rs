//! # Rental Payment Engine
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter and the provider client
//! - Start the expiry sweeper and the notification worker
//! - Start the HTTP server

mod config;

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rental_gateway::{StripeConfig, StripeGatewayFactory};
use rental_hex::{ExpirySweeper, RentalService, ServiceSettings, inbound::HttpServer};
use rental_repo::{NotificationWorker, NotifierConfig, build_repo};

fn init_tracer() -> anyhow::Result<(sdktrace::Tracer, sdktrace::SdkTracerProvider)> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    Ok((provider.tracer("rental-service"), provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer()?;
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rental_app=debug,rental_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting rental server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let gateways = StripeGatewayFactory::new(
        StripeConfig::new(&config.provider_api_base, &config.provider_secret_key)
            .with_timeout(config.provider_timeout),
    )?;

    let service = RentalService::new(
        repo.clone(),
        gateways,
        ServiceSettings::new(&config.public_base_url, &config.webhook_secret),
    );

    let sweeper = ExpirySweeper::new(service.deposits().clone(), config.expiry_sweep_interval);
    tokio::spawn(sweeper.run());

    match config.notifier {
        Some(notifier) => {
            let worker = NotificationWorker::new(
                Arc::new(repo),
                NotifierConfig {
                    url: notifier.url,
                    secret: notifier.secret,
                    poll_interval: Duration::from_secs(5),
                    batch_size: 50,
                },
            );
            tokio::spawn(worker.run());
        }
        None => tracing::warn!("NOTIFIER_URL not set, domain events stay in the outbox"),
    }

    // Create and run the HTTP server
    let server =
        HttpServer::with_rate_limit(service, &config.api_key, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}
