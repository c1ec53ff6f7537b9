//! Notification outbox worker.
//!
//! Domain events are written to `domain_events` after a transition commits.
//! The worker claims them (PENDING -> PROCESSING) before sending, so each
//! event is POSTed at most once; a failed delivery is recorded, never retried.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::Repo;
use crate::security::notification_signature;

/// A claimed outbox row.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Delivered,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

/// Where and how to deliver notifications.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub url: String,
    /// HMAC key for the timestamped `X-Signature` header.
    pub secret: String,
    pub poll_interval: Duration,
    pub batch_size: i64,
}

pub struct NotificationWorker {
    repo: std::sync::Arc<Repo>,
    client: reqwest::Client,
    config: NotifierConfig,
}

impl NotificationWorker {
    pub fn new(repo: std::sync::Arc<Repo>, config: NotifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            repo,
            client,
            config,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(self) {
        info!("Starting notification worker sending to {}", self.config.url);
        loop {
            self.run_once().await;
            sleep(self.config.poll_interval).await;
        }
    }

    /// Claims and delivers one batch. Returns the number of events handled.
    pub async fn run_once(&self) -> usize {
        match self.repo.claim_pending_events(self.config.batch_size).await {
            Ok(events) => {
                let count = events.len();
                if count > 0 {
                    info!("Delivering {} domain events", count);
                }
                for event in events {
                    self.deliver(event).await;
                }
                count
            }
            Err(e) => {
                error!("Failed to claim domain events: {}", e);
                0
            }
        }
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn deliver(&self, event: OutboxEvent) {
        let body = serde_json::json!({
            "id": event.id,
            "created_at": event.created_at,
            "event": event.payload,
        });
        let bytes = body.to_string().into_bytes();

        let signature = notification_signature(&bytes, &self.config.secret, Utc::now());
        let (status, last_error) = match signature {
            Ok(signature) => {
                let result = self
                    .client
                    .post(&self.config.url)
                    .header("Content-Type", "application/json")
                    .header("X-Event-Type", &event.event_type)
                    .header("X-Signature", signature)
                    .body(bytes)
                    .send()
                    .await;
                match result {
                    Ok(resp) if resp.status().is_success() => (OutboxStatus::Delivered, None),
                    Ok(resp) => (
                        OutboxStatus::Failed,
                        Some(format!("HTTP {}", resp.status())),
                    ),
                    Err(e) => (OutboxStatus::Failed, Some(e.to_string())),
                }
            }
            Err(e) => (OutboxStatus::Failed, Some(format!("Cannot sign notification: {e}"))),
        };

        if let Some(err) = &last_error {
            warn!(error = %err, "Notification delivery failed; not retrying");
        }

        if let Err(e) = self
            .repo
            .mark_event_delivery(event.id, status, last_error)
            .await
        {
            error!("Failed to update domain event status: {}", e);
        }
    }
}
