//! Shared database types with feature-gated column representations for
//! SQLite and PostgreSQL.
//!
//! SQLite stores ids, timestamps and decimals as TEXT, booleans as INTEGER
//! and JSON as TEXT; PostgreSQL uses native UUID, TIMESTAMPTZ, NUMERIC,
//! BOOLEAN and JSONB columns. The `Db*` aliases and the `to_db`/`from_db`
//! helpers hide the difference from the query code.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use rental_types::domain::{
    AuditEntry, CurrencyCode, CustomerId, DepositState, Payment, PaymentId, Reservation,
    ReservationId, StoreAccount, StoreId,
};
use rental_types::{DomainError, RepoError};

use crate::outbox::OutboxEvent;

// ─────────────────────────────────────────────────────────────────────────────
// Column representations
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "sqlite"))]
mod repr {
    use super::*;

    pub type DbUuid = Uuid;
    pub type DbTime = DateTime<Utc>;
    pub type DbDecimal = Decimal;
    pub type DbBool = bool;
    pub type DbJson = serde_json::Value;

    pub fn uuid(id: Uuid) -> DbUuid {
        id
    }
    pub fn time(t: DateTime<Utc>) -> DbTime {
        t
    }
    pub fn decimal(d: Decimal) -> DbDecimal {
        d
    }
    pub fn boolean(b: bool) -> DbBool {
        b
    }
    pub fn json(v: &serde_json::Value) -> DbJson {
        v.clone()
    }

    pub fn parse_uuid(v: DbUuid) -> Result<Uuid, RepoError> {
        Ok(v)
    }
    pub fn parse_time(v: DbTime) -> Result<DateTime<Utc>, RepoError> {
        Ok(v)
    }
    pub fn parse_decimal(v: DbDecimal) -> Result<Decimal, RepoError> {
        Ok(v)
    }
    pub fn parse_bool(v: DbBool) -> bool {
        v
    }
    pub fn parse_json(v: DbJson) -> Result<serde_json::Value, RepoError> {
        Ok(v)
    }
}

#[cfg(feature = "sqlite")]
mod repr {
    use super::*;
    use chrono::SecondsFormat;

    pub type DbUuid = String;
    pub type DbTime = String;
    pub type DbDecimal = String;
    pub type DbBool = i64;
    pub type DbJson = String;

    fn db_err(e: impl std::fmt::Display) -> RepoError {
        RepoError::Database(e.to_string())
    }

    pub fn uuid(id: Uuid) -> DbUuid {
        id.to_string()
    }
    /// Fixed-width UTC text, so lexical order matches time order.
    pub fn time(t: DateTime<Utc>) -> DbTime {
        t.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
    pub fn decimal(d: Decimal) -> DbDecimal {
        d.to_string()
    }
    pub fn boolean(b: bool) -> DbBool {
        b as i64
    }
    pub fn json(v: &serde_json::Value) -> DbJson {
        v.to_string()
    }

    pub fn parse_uuid(v: DbUuid) -> Result<Uuid, RepoError> {
        Uuid::parse_str(&v).map_err(db_err)
    }
    pub fn parse_time(v: DbTime) -> Result<DateTime<Utc>, RepoError> {
        Ok(DateTime::parse_from_rfc3339(&v)
            .map_err(db_err)?
            .with_timezone(&Utc))
    }
    pub fn parse_decimal(v: DbDecimal) -> Result<Decimal, RepoError> {
        Decimal::from_str(&v).map_err(db_err)
    }
    pub fn parse_bool(v: DbBool) -> bool {
        v != 0
    }
    pub fn parse_json(v: DbJson) -> Result<serde_json::Value, RepoError> {
        serde_json::from_str(&v).map_err(db_err)
    }
}

pub use repr::*;

fn parse_opt<T, U>(
    v: Option<T>,
    f: impl FnOnce(T) -> Result<U, RepoError>,
) -> Result<Option<U>, RepoError> {
    v.map(f).transpose()
}

/// Parses a stored enum or code through its `FromStr` impl.
pub fn parse_text<T>(s: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = DomainError>,
{
    s.parse().map_err(RepoError::Domain)
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Store row from database.
#[derive(FromRow)]
pub struct DbStore {
    pub store_id: DbUuid,
    pub gateway_account_id: Option<String>,
    pub charges_enabled: DbBool,
    pub payouts_enabled: DbBool,
    pub details_submitted: DbBool,
    pub country: Option<String>,
    pub email: Option<String>,
    pub updated_at: DbTime,
}

impl DbStore {
    pub fn into_domain(self) -> Result<StoreAccount, RepoError> {
        Ok(StoreAccount {
            store_id: StoreId::from_uuid(parse_uuid(self.store_id)?),
            gateway_account_id: self.gateway_account_id,
            charges_enabled: parse_bool(self.charges_enabled),
            payouts_enabled: parse_bool(self.payouts_enabled),
            details_submitted: parse_bool(self.details_submitted),
            country: self.country,
            email: self.email,
            updated_at: parse_time(self.updated_at)?,
        })
    }
}

/// Reservation row from database.
#[derive(FromRow)]
pub struct DbReservation {
    pub id: DbUuid,
    pub number: String,
    pub status: String,
    pub store_id: DbUuid,
    pub customer_id: DbUuid,
    pub start_date: DbTime,
    pub end_date: DbTime,
    pub currency: String,
    pub subtotal_amount: DbDecimal,
    pub tax_amount: DbDecimal,
    pub deposit_amount: DbDecimal,
    pub total_amount: DbDecimal,
    pub deposit_status: String,
    pub deposit_intent_ref: Option<String>,
    pub deposit_setup_intent: DbBool,
    pub deposit_hold_amount: Option<DbDecimal>,
    pub deposit_captured_amount: Option<DbDecimal>,
    pub deposit_expires_at: Option<DbTime>,
    pub saved_payment_method: Option<String>,
    pub gateway_customer: Option<String>,
    pub version: i64,
    pub created_at: DbTime,
    pub updated_at: DbTime,
}

pub const RESERVATION_COLUMNS: &str = "id, number, status, store_id, customer_id, start_date, \
    end_date, currency, subtotal_amount, tax_amount, deposit_amount, total_amount, \
    deposit_status, deposit_intent_ref, deposit_setup_intent, deposit_hold_amount, \
    deposit_captured_amount, deposit_expires_at, saved_payment_method, gateway_customer, \
    version, created_at, updated_at";

impl DbReservation {
    /// Convert database row to domain Reservation.
    pub fn into_domain(self) -> Result<Reservation, RepoError> {
        let deposit = DepositState::from_parts(
            parse_text(&self.deposit_status)?,
            self.deposit_intent_ref,
            parse_bool(self.deposit_setup_intent),
            parse_opt(self.deposit_hold_amount, parse_decimal)?,
            parse_opt(self.deposit_captured_amount, parse_decimal)?,
            parse_opt(self.deposit_expires_at, parse_time)?,
        );

        Ok(Reservation {
            id: ReservationId::from_uuid(parse_uuid(self.id)?),
            number: self.number,
            status: parse_text(&self.status)?,
            store_id: StoreId::from_uuid(parse_uuid(self.store_id)?),
            customer_id: CustomerId::from_uuid(parse_uuid(self.customer_id)?),
            start_date: parse_time(self.start_date)?,
            end_date: parse_time(self.end_date)?,
            currency: parse_text::<CurrencyCode>(&self.currency)?,
            subtotal_amount: parse_decimal(self.subtotal_amount)?,
            tax_amount: parse_decimal(self.tax_amount)?,
            deposit_amount: parse_decimal(self.deposit_amount)?,
            total_amount: parse_decimal(self.total_amount)?,
            deposit,
            saved_payment_method: self.saved_payment_method,
            gateway_customer: self.gateway_customer,
            version: self.version,
            created_at: parse_time(self.created_at)?,
            updated_at: parse_time(self.updated_at)?,
        })
    }
}

/// Payment row from database.
#[derive(FromRow)]
pub struct DbPayment {
    pub id: DbUuid,
    pub reservation_id: DbUuid,
    pub payment_type: String,
    pub method: String,
    pub status: String,
    pub amount: DbDecimal,
    pub currency: String,
    pub external_reference: Option<String>,
    pub created_at: DbTime,
    pub paid_at: Option<DbTime>,
}

pub const PAYMENT_COLUMNS: &str = "id, reservation_id, payment_type, method, status, amount, \
    currency, external_reference, created_at, paid_at";

impl DbPayment {
    /// Convert database row to domain Payment.
    pub fn into_domain(self) -> Result<Payment, RepoError> {
        Ok(Payment {
            id: PaymentId::from_uuid(parse_uuid(self.id)?),
            reservation_id: ReservationId::from_uuid(parse_uuid(self.reservation_id)?),
            payment_type: parse_text(&self.payment_type)?,
            method: parse_text(&self.method)?,
            status: parse_text(&self.status)?,
            amount: parse_decimal(self.amount)?,
            currency: parse_text(&self.currency)?,
            external_reference: self.external_reference,
            created_at: parse_time(self.created_at)?,
            paid_at: parse_opt(self.paid_at, parse_time)?,
        })
    }
}

/// Audit log row from database.
#[derive(FromRow)]
pub struct DbAuditEntry {
    pub reservation_id: DbUuid,
    pub actor: String,
    pub action: String,
    pub detail: DbJson,
    pub created_at: DbTime,
}

impl DbAuditEntry {
    pub fn into_domain(self) -> Result<AuditEntry, RepoError> {
        Ok(AuditEntry {
            reservation_id: ReservationId::from_uuid(parse_uuid(self.reservation_id)?),
            actor: self.actor,
            action: self.action,
            detail: parse_json(self.detail)?,
            created_at: parse_time(self.created_at)?,
        })
    }
}

/// Outbox row from database.
#[derive(FromRow)]
pub struct DbDomainEvent {
    pub id: DbUuid,
    pub event_type: String,
    pub payload: DbJson,
    pub created_at: DbTime,
}

impl DbDomainEvent {
    pub fn into_domain(self) -> Result<OutboxEvent, RepoError> {
        Ok(OutboxEvent {
            id: parse_uuid(self.id)?,
            event_type: self.event_type,
            payload: parse_json(self.payload)?,
            created_at: parse_time(self.created_at)?,
        })
    }
}

/// Single-column id row.
#[derive(FromRow)]
pub struct DbId {
    pub id: DbUuid,
}
