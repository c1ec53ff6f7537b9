//! Rental CLI
//!
//! Command-line interface for the rental payment API, for staff and ops.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use rental_client::{ClientError, RentalClient};
use rental_types::domain::{PaymentMethod, PaymentType, ReservationAction};
use rental_types::{
    AuthorizationMode, CheckoutKind, CheckoutRequest, RecordPaymentRequest, ReservationId,
    StoreId,
};

#[derive(Parser)]
#[command(name = "rental")]
#[command(author, version, about = "Rental payment API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the rental API
    #[arg(long, env = "RENTAL_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// API key for authentication
    #[arg(long, env = "RENTAL_API_KEY")]
    api_key: Option<String>,

    /// Staff member recorded in the audit trail
    #[arg(long, env = "RENTAL_ACTOR")]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reservation lifecycle
    Reservation {
        #[command(subcommand)]
        action: ReservationCommands,
    },
    /// Security deposit operations
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },
    /// Hosted checkout sessions
    Checkout {
        #[command(subcommand)]
        action: CheckoutCommands,
    },
    /// Payments taken outside the provider
    Payment {
        #[command(subcommand)]
        action: PaymentCommands,
    },
    /// Store sub-account onboarding
    Store {
        #[command(subcommand)]
        action: StoreCommands,
    },
    /// Print domain-event notifications as they arrive
    Listen {
        /// Port to listen on
        #[arg(long, default_value = "4000")]
        port: u16,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum ReservationCommands {
    /// Reservation with payments and ledger
    Get { id: String },
    /// Payments recorded against a reservation
    Payments { id: String },
    /// Warnings a pickup or return would raise
    Warnings { id: String },
    /// Audit trail
    Audit { id: String },
    Confirm { id: String },
    Reject { id: String },
    /// Hand the item over
    Pickup {
        id: String,
        /// Proceed despite payment warnings
        #[arg(long)]
        acknowledge: bool,
    },
    /// Take the item back
    Return {
        id: String,
        #[arg(long)]
        acknowledge: bool,
    },
    /// Cancel, settling the deposit
    Cancel { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Interactive,
    OffSession,
}

#[derive(Subcommand)]
enum DepositCommands {
    /// Place a hold on the customer's card
    Authorize {
        id: String,
        #[arg(long, value_enum, default_value = "interactive")]
        mode: Mode,
        /// Hold amount; the reservation's deposit when omitted
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Capture all or part of the hold
    Capture {
        id: String,
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Release the hold
    Release { id: String },
    /// Return a captured deposit
    Return {
        id: String,
        #[arg(long)]
        amount: Decimal,
        /// gateway, cash, card, transfer, check or other
        #[arg(long, default_value = "gateway")]
        method: String,
    },
}

#[derive(Subcommand)]
enum CheckoutCommands {
    /// Open a checkout session for the outstanding balance or an explicit amount
    Create {
        id: String,
        /// Send a payment link instead of a booking checkout
        #[arg(long)]
        payment_request: bool,
        #[arg(long)]
        amount: Option<Decimal>,
        /// rental or damage
        #[arg(long)]
        purpose: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Record a cash, card or transfer payment
    Record {
        id: String,
        /// rental, deposit, deposit_return or damage
        #[arg(long = "type", default_value = "rental")]
        payment_type: String,
        #[arg(long, default_value = "cash")]
        method: String,
        #[arg(long)]
        amount: Decimal,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Create the store's sub-account
    Connect {
        id: String,
        #[arg(long)]
        email: String,
        /// Two-letter country code
        #[arg(long)]
        country: String,
    },
    /// Print a hosted onboarding link
    Link {
        id: String,
        #[arg(long)]
        return_url: String,
        #[arg(long)]
        refresh_url: String,
    },
    /// Refresh capability flags from the provider
    Status {
        id: String,
        /// Show the stored flags without asking the provider
        #[arg(long)]
        cached: bool,
    },
}

fn parse_reservation_id(s: &str) -> Result<ReservationId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid reservation ID: {}", s))
}

fn parse_store_id(s: &str) -> Result<StoreId> {
    s.parse()
        .map_err(|_| anyhow::anyhow!("Invalid store ID: {}", s))
}

fn print<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn transition(
    client: &RentalClient,
    id: &str,
    action: ReservationAction,
    acknowledge: bool,
) -> Result<()> {
    match client
        .transition(parse_reservation_id(id)?, action, acknowledge)
        .await
    {
        Ok(response) => print(&response),
        Err(ClientError::Api { code, warnings, .. }) if code == "ACKNOWLEDGEMENT_REQUIRED" => {
            eprintln!("✗ {} needs acknowledgement:", action);
            for warning in warnings {
                eprintln!("  - {}", warning.as_ref());
            }
            eprintln!("Re-run with --acknowledge to proceed.");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut client = RentalClient::new(&cli.api_url);
    if let Some(key) = cli.api_key {
        client = client.with_api_key(key);
    }
    if let Some(actor) = cli.actor {
        client = client.with_actor(actor);
    }

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Reservation { action } => match action {
            ReservationCommands::Get { id } => {
                print(&client.get_reservation(parse_reservation_id(&id)?).await?)?
            }
            ReservationCommands::Payments { id } => {
                print(&client.list_payments(parse_reservation_id(&id)?).await?)?
            }
            ReservationCommands::Warnings { id } => {
                print(&client.warnings(parse_reservation_id(&id)?).await?)?
            }
            ReservationCommands::Audit { id } => {
                print(&client.audit(parse_reservation_id(&id)?).await?)?
            }
            ReservationCommands::Confirm { id } => {
                transition(&client, &id, ReservationAction::Confirm, false).await?
            }
            ReservationCommands::Reject { id } => {
                transition(&client, &id, ReservationAction::Reject, false).await?
            }
            ReservationCommands::Pickup { id, acknowledge } => {
                transition(&client, &id, ReservationAction::Pickup, acknowledge).await?
            }
            ReservationCommands::Return { id, acknowledge } => {
                transition(&client, &id, ReservationAction::Return, acknowledge).await?
            }
            ReservationCommands::Cancel { id } => {
                transition(&client, &id, ReservationAction::Cancel, false).await?
            }
        },

        Commands::Deposit { action } => match action {
            DepositCommands::Authorize { id, mode, amount } => {
                let mode = match mode {
                    Mode::Interactive => AuthorizationMode::Interactive,
                    Mode::OffSession => AuthorizationMode::OffSession,
                };
                let response = client
                    .authorize_deposit(parse_reservation_id(&id)?, mode, amount)
                    .await?;
                print(&response)?;
            }
            DepositCommands::Capture { id, amount } => {
                print(
                    &client
                        .capture_deposit(parse_reservation_id(&id)?, amount)
                        .await?,
                )?;
            }
            DepositCommands::Release { id } => {
                print(&client.release_deposit(parse_reservation_id(&id)?).await?)?;
            }
            DepositCommands::Return { id, amount, method } => {
                let method: PaymentMethod = method.parse()?;
                print(
                    &client
                        .return_deposit(parse_reservation_id(&id)?, amount, method)
                        .await?,
                )?;
            }
        },

        Commands::Checkout { action } => match action {
            CheckoutCommands::Create {
                id,
                payment_request,
                amount,
                purpose,
                email,
            } => {
                let purpose: Option<PaymentType> = purpose.map(|p| p.parse()).transpose()?;
                let req = CheckoutRequest {
                    kind: if payment_request {
                        CheckoutKind::PaymentRequest
                    } else {
                        CheckoutKind::Initial
                    },
                    amount,
                    purpose,
                    customer_email: email,
                    ..Default::default()
                };
                let session = client
                    .create_checkout(parse_reservation_id(&id)?, &req)
                    .await?;
                print(&session)?;
            }
        },

        Commands::Payment { action } => match action {
            PaymentCommands::Record {
                id,
                payment_type,
                method,
                amount,
            } => {
                let req = RecordPaymentRequest {
                    payment_type: payment_type.parse()?,
                    method: method.parse()?,
                    amount,
                };
                print(
                    &client
                        .record_payment(parse_reservation_id(&id)?, &req)
                        .await?,
                )?;
            }
        },

        Commands::Store { action } => match action {
            StoreCommands::Connect { id, email, country } => {
                print(
                    &client
                        .connect_store(parse_store_id(&id)?, &email, &country)
                        .await?,
                )?;
            }
            StoreCommands::Link {
                id,
                return_url,
                refresh_url,
            } => {
                let url = client
                    .onboarding_link(parse_store_id(&id)?, &return_url, &refresh_url)
                    .await?;
                println!("{}", url);
            }
            StoreCommands::Status { id, cached } => {
                let id = parse_store_id(&id)?;
                let store = if cached {
                    client.get_store(id).await?
                } else {
                    client.refresh_store(id).await?
                };
                print(&store)?;
            }
        },

        Commands::Listen { port } => {
            let app = axum::Router::new().route("/", axum::routing::post(handle_notification));
            let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
            println!("Listening for notifications on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}

async fn handle_notification(
    headers: axum::http::HeaderMap,
    body: String,
) -> impl axum::response::IntoResponse {
    println!("POST / HTTP/1.1");
    for (name, value) in &headers {
        println!("{}: {:?}", name, value);
    }
    println!();
    println!("{}", body);
    println!("----------------------------------------");
    axum::http::StatusCode::OK
}
