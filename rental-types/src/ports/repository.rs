//! Repository port trait.
//!
//! Adapters (Postgres, SQLite, in-memory test doubles) implement this trait.

use chrono::{DateTime, Utc};

use crate::domain::{
    AuditEntry, DomainEvent, NewPayment, Payment, PaymentStatus, Reservation, ReservationId,
    StoreAccount, StoreId,
};
use crate::error::RepoError;

/// Outcome of appending a payment row.
#[derive(Debug, Clone)]
pub enum PaymentRecord {
    Created(Payment),
    /// A row with the same external reference already existed.
    Existing(Payment),
}

impl PaymentRecord {
    pub fn payment(&self) -> &Payment {
        match self {
            PaymentRecord::Created(p) | PaymentRecord::Existing(p) => p,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, PaymentRecord::Created(_))
    }
}

/// Result of a committed reservation write.
#[derive(Debug, Clone)]
pub struct SavedReservation {
    /// The reservation as stored, with its bumped version.
    pub reservation: Reservation,
    pub payment: Option<PaymentRecord>,
}

/// The persistence port for reservations and their payment ledger.
///
/// `save_reservation` MUST be atomic: the version check, the reservation
/// update and the optional payment insert commit together or not at all.
#[async_trait::async_trait]
pub trait ReservationRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Stores
    // ─────────────────────────────────────────────────────────────────────────────

    async fn get_store(&self, id: StoreId) -> Result<Option<StoreAccount>, RepoError>;

    async fn find_store_by_gateway_account(
        &self,
        account_id: &str,
    ) -> Result<Option<StoreAccount>, RepoError>;

    async fn upsert_store(&self, store: &StoreAccount) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reservations
    // ─────────────────────────────────────────────────────────────────────────────

    async fn create_reservation(&self, reservation: &Reservation) -> Result<(), RepoError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, RepoError>;

    /// Writes status, deposit projection and saved payment method, optionally
    /// appending a payment in the same transaction.
    ///
    /// Fails with [`RepoError::Conflict`] when the stored version differs from
    /// `reservation.version`.
    async fn save_reservation(
        &self,
        reservation: &Reservation,
        payment: Option<NewPayment>,
    ) -> Result<SavedReservation, RepoError>;

    /// Reservations whose authorized hold expired before `now`.
    async fn list_expired_authorizations(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ReservationId>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Payments (append-only; external_reference is the idempotency key)
    // ─────────────────────────────────────────────────────────────────────────────

    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentRecord, RepoError>;

    async fn find_payment_by_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<Payment>, RepoError>;

    async fn update_payment_status(
        &self,
        external_reference: &str,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, RepoError>;

    async fn list_payments(&self, reservation_id: ReservationId)
    -> Result<Vec<Payment>, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Provider event dedup
    // ─────────────────────────────────────────────────────────────────────────────

    async fn is_event_processed(&self, event_id: &str) -> Result<bool, RepoError>;

    /// Records a handled event id. Returns false if it was already recorded.
    async fn mark_event_processed(&self, event_id: &str, event_type: &str)
    -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Audit & notifications
    // ─────────────────────────────────────────────────────────────────────────────

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError>;

    async fn list_audit(&self, reservation_id: ReservationId)
    -> Result<Vec<AuditEntry>, RepoError>;

    /// Queues a domain event in the notification outbox.
    async fn enqueue_domain_event(&self, event: &DomainEvent) -> Result<(), RepoError>;
}
