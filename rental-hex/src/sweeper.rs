//! Periodic reconciliation of expired deposit holds.

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, instrument};

use rental_types::{GatewayFactory, ReservationRepository};

use crate::service::{DepositAuthorizationManager, ExpiryReport};

pub struct ExpirySweeper<R, G> {
    deposits: DepositAuthorizationManager<R, G>,
    interval: Duration,
}

impl<R: ReservationRepository, G: GatewayFactory> ExpirySweeper<R, G> {
    pub fn new(deposits: DepositAuthorizationManager<R, G>, interval: Duration) -> Self {
        Self { deposits, interval }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Starting expiry sweeper every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    /// One sweep. Failures are logged; the next tick tries again.
    pub async fn run_once(&self) -> Option<ExpiryReport> {
        match self.deposits.reconcile_expiry(Utc::now()).await {
            Ok(report) => {
                if report.checked > 0 {
                    info!(?report, "Expiry sweep finished");
                }
                Some(report)
            }
            Err(e) => {
                error!("Expiry sweep failed: {}", e);
                None
            }
        }
    }
}
