//! Query code shared by the SQLite and PostgreSQL adapters.
//!
//! Both backends accept `$N` placeholders, and the column representation
//! differences live in [`crate::types`], so the statements below are written
//! once and expanded per backend by [`impl_repository!`]. Each backend module
//! supplies its own `CLAIM_EVENTS_SQL` (PostgreSQL adds `SKIP LOCKED`).

use rental_types::RepoError;

pub(crate) fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

pub(crate) fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

/// Implements `ReservationRepository` and the outbox methods for `$repo`,
/// whose pool hands out `$conn` connections.
macro_rules! impl_repository {
    ($repo:ty, $conn:ty) => {
        use chrono::{DateTime, Utc};
        use rental_types::domain::{
            AuditEntry, DomainEvent, NewPayment, Payment, PaymentStatus, Reservation,
            ReservationId, StoreAccount, StoreId,
        };
        use rental_types::ports::{PaymentRecord, ReservationRepository, SavedReservation};
        use rental_types::RepoError;

        use crate::outbox::{OutboxEvent, OutboxStatus};
        use crate::queries::{db_err, tx_err};
        use crate::types::{
            self, DbAuditEntry, DbDomainEvent, DbId, DbPayment, DbReservation, DbStore,
            PAYMENT_COLUMNS, RESERVATION_COLUMNS,
        };

        impl $repo {
            async fn insert_payment(
                conn: &mut $conn,
                payment: NewPayment,
            ) -> Result<PaymentRecord, RepoError> {
                let payment = payment.into_payment();
                let sql = format!(
                    "INSERT INTO payments ({PAYMENT_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     ON CONFLICT (external_reference) DO NOTHING"
                );
                let result = sqlx::query(&sql)
                    .bind(types::uuid(payment.id.into_uuid()))
                    .bind(types::uuid(payment.reservation_id.into_uuid()))
                    .bind(payment.payment_type.to_string())
                    .bind(payment.method.to_string())
                    .bind(payment.status.to_string())
                    .bind(types::decimal(payment.amount))
                    .bind(payment.currency.to_string())
                    .bind(&payment.external_reference)
                    .bind(types::time(payment.created_at))
                    .bind(payment.paid_at.map(types::time))
                    .execute(&mut *conn)
                    .await
                    .map_err(db_err)?;

                if result.rows_affected() == 1 {
                    return Ok(PaymentRecord::Created(payment));
                }

                // Only a duplicate external reference can make the insert a no-op.
                let reference = payment
                    .external_reference
                    .as_deref()
                    .ok_or_else(|| RepoError::Database("payment insert ignored".into()))?;
                let sql =
                    format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_reference = $1");
                let row: DbPayment = sqlx::query_as(&sql)
                    .bind(reference)
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(db_err)?;
                Ok(PaymentRecord::Existing(row.into_domain()?))
            }

            // ─────────────────────────────────────────────────────────────────
            // Notification outbox
            // ─────────────────────────────────────────────────────────────────

            /// Atomically moves up to `limit` pending events to PROCESSING and
            /// returns them. A claimed event is never handed out twice.
            pub async fn claim_pending_events(
                &self,
                limit: i64,
            ) -> Result<Vec<OutboxEvent>, RepoError> {
                let rows: Vec<DbDomainEvent> = sqlx::query_as(CLAIM_EVENTS_SQL)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;

                let mut events = rows
                    .into_iter()
                    .map(DbDomainEvent::into_domain)
                    .collect::<Result<Vec<_>, _>>()?;
                events.sort_by_key(|e| e.created_at);
                Ok(events)
            }

            pub async fn mark_event_delivery(
                &self,
                id: uuid::Uuid,
                status: OutboxStatus,
                last_error: Option<String>,
            ) -> Result<(), RepoError> {
                sqlx::query(
                    "UPDATE domain_events SET status = $1, processed_at = $2, last_error = $3 \
                     WHERE id = $4",
                )
                .bind(status.as_str())
                .bind(types::time(Utc::now()))
                .bind(last_error)
                .bind(types::uuid(id))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl ReservationRepository for $repo {
            // ─────────────────────────────────────────────────────────────────
            // Stores
            // ─────────────────────────────────────────────────────────────────

            async fn get_store(&self, id: StoreId) -> Result<Option<StoreAccount>, RepoError> {
                let row: Option<DbStore> = sqlx::query_as(
                    "SELECT store_id, gateway_account_id, charges_enabled, payouts_enabled, \
                     details_submitted, country, email, updated_at FROM stores WHERE store_id = $1",
                )
                .bind(types::uuid(id.into_uuid()))
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

                row.map(DbStore::into_domain).transpose()
            }

            async fn find_store_by_gateway_account(
                &self,
                account_id: &str,
            ) -> Result<Option<StoreAccount>, RepoError> {
                let row: Option<DbStore> = sqlx::query_as(
                    "SELECT store_id, gateway_account_id, charges_enabled, payouts_enabled, \
                     details_submitted, country, email, updated_at FROM stores \
                     WHERE gateway_account_id = $1",
                )
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

                row.map(DbStore::into_domain).transpose()
            }

            async fn upsert_store(&self, store: &StoreAccount) -> Result<(), RepoError> {
                sqlx::query(
                    "INSERT INTO stores (store_id, gateway_account_id, charges_enabled, \
                     payouts_enabled, details_submitted, country, email, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     ON CONFLICT (store_id) DO UPDATE SET \
                     gateway_account_id = excluded.gateway_account_id, \
                     charges_enabled = excluded.charges_enabled, \
                     payouts_enabled = excluded.payouts_enabled, \
                     details_submitted = excluded.details_submitted, \
                     country = excluded.country, email = excluded.email, \
                     updated_at = excluded.updated_at",
                )
                .bind(types::uuid(store.store_id.into_uuid()))
                .bind(&store.gateway_account_id)
                .bind(types::boolean(store.charges_enabled))
                .bind(types::boolean(store.payouts_enabled))
                .bind(types::boolean(store.details_submitted))
                .bind(&store.country)
                .bind(&store.email)
                .bind(types::time(store.updated_at))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(())
            }

            // ─────────────────────────────────────────────────────────────────
            // Reservations
            // ─────────────────────────────────────────────────────────────────

            async fn create_reservation(&self, r: &Reservation) -> Result<(), RepoError> {
                let sql = format!(
                    "INSERT INTO reservations ({RESERVATION_COLUMNS}) VALUES \
                     ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20, $21, $22, $23)"
                );
                let deposit = &r.deposit;
                sqlx::query(&sql)
                    .bind(types::uuid(r.id.into_uuid()))
                    .bind(&r.number)
                    .bind(r.status.to_string())
                    .bind(types::uuid(r.store_id.into_uuid()))
                    .bind(types::uuid(r.customer_id.into_uuid()))
                    .bind(types::time(r.start_date))
                    .bind(types::time(r.end_date))
                    .bind(r.currency.to_string())
                    .bind(types::decimal(r.subtotal_amount))
                    .bind(types::decimal(r.tax_amount))
                    .bind(types::decimal(r.deposit_amount))
                    .bind(types::decimal(r.total_amount))
                    .bind(deposit.status().to_string())
                    .bind(deposit.intent_ref())
                    .bind(types::boolean(deposit.is_setup_intent()))
                    .bind(deposit.hold_amount().map(types::decimal))
                    .bind(deposit.captured_amount().map(types::decimal))
                    .bind(deposit.expires_at().map(types::time))
                    .bind(&r.saved_payment_method)
                    .bind(&r.gateway_customer)
                    .bind(r.version)
                    .bind(types::time(r.created_at))
                    .bind(types::time(r.updated_at))
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
                Ok(())
            }

            async fn get_reservation(
                &self,
                id: ReservationId,
            ) -> Result<Option<Reservation>, RepoError> {
                let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
                let row: Option<DbReservation> = sqlx::query_as(&sql)
                    .bind(types::uuid(id.into_uuid()))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_err)?;

                row.map(DbReservation::into_domain).transpose()
            }

            async fn save_reservation(
                &self,
                r: &Reservation,
                payment: Option<NewPayment>,
            ) -> Result<SavedReservation, RepoError> {
                let mut tx = self.pool.begin().await.map_err(tx_err)?;

                let now = Utc::now();
                let deposit = &r.deposit;
                let result = sqlx::query(
                    "UPDATE reservations SET status = $1, deposit_status = $2, \
                     deposit_intent_ref = $3, deposit_setup_intent = $4, \
                     deposit_hold_amount = $5, deposit_captured_amount = $6, \
                     deposit_expires_at = $7, saved_payment_method = $8, \
                     gateway_customer = $9, version = version + 1, updated_at = $10 \
                     WHERE id = $11 AND version = $12",
                )
                .bind(r.status.to_string())
                .bind(deposit.status().to_string())
                .bind(deposit.intent_ref())
                .bind(types::boolean(deposit.is_setup_intent()))
                .bind(deposit.hold_amount().map(types::decimal))
                .bind(deposit.captured_amount().map(types::decimal))
                .bind(deposit.expires_at().map(types::time))
                .bind(&r.saved_payment_method)
                .bind(&r.gateway_customer)
                .bind(types::time(now))
                .bind(types::uuid(r.id.into_uuid()))
                .bind(r.version)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;

                if result.rows_affected() == 0 {
                    let exists: Option<DbId> =
                        sqlx::query_as("SELECT id FROM reservations WHERE id = $1")
                            .bind(types::uuid(r.id.into_uuid()))
                            .fetch_optional(&mut *tx)
                            .await
                            .map_err(db_err)?;
                    return Err(match exists {
                        Some(_) => RepoError::Conflict(format!(
                            "reservation {} changed since version {}",
                            r.id, r.version
                        )),
                        None => RepoError::NotFound,
                    });
                }

                let payment = match payment {
                    Some(p) => Some(Self::insert_payment(&mut tx, p).await?),
                    None => None,
                };

                tx.commit().await.map_err(tx_err)?;

                let mut reservation = r.clone();
                reservation.version += 1;
                reservation.updated_at = now;
                Ok(SavedReservation {
                    reservation,
                    payment,
                })
            }

            async fn list_expired_authorizations(
                &self,
                now: DateTime<Utc>,
                limit: i64,
            ) -> Result<Vec<ReservationId>, RepoError> {
                let rows: Vec<DbId> = sqlx::query_as(
                    "SELECT id FROM reservations \
                     WHERE deposit_status = 'authorized' AND deposit_expires_at < $1 \
                     ORDER BY deposit_expires_at ASC LIMIT $2",
                )
                .bind(types::time(now))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

                rows.into_iter()
                    .map(|row| Ok(ReservationId::from_uuid(types::parse_uuid(row.id)?)))
                    .collect()
            }

            // ─────────────────────────────────────────────────────────────────
            // Payments
            // ─────────────────────────────────────────────────────────────────

            async fn record_payment(&self, payment: NewPayment) -> Result<PaymentRecord, RepoError> {
                let mut tx = self.pool.begin().await.map_err(tx_err)?;
                let record = Self::insert_payment(&mut tx, payment).await?;
                tx.commit().await.map_err(tx_err)?;
                Ok(record)
            }

            async fn find_payment_by_reference(
                &self,
                external_reference: &str,
            ) -> Result<Option<Payment>, RepoError> {
                let sql =
                    format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE external_reference = $1");
                let row: Option<DbPayment> = sqlx::query_as(&sql)
                    .bind(external_reference)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(db_err)?;

                row.map(DbPayment::into_domain).transpose()
            }

            async fn update_payment_status(
                &self,
                external_reference: &str,
                status: PaymentStatus,
            ) -> Result<Option<Payment>, RepoError> {
                let result = sqlx::query(
                    "UPDATE payments SET status = $1 WHERE external_reference = $2",
                )
                .bind(status.to_string())
                .bind(external_reference)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

                if result.rows_affected() == 0 {
                    return Ok(None);
                }
                self.find_payment_by_reference(external_reference).await
            }

            async fn list_payments(
                &self,
                reservation_id: ReservationId,
            ) -> Result<Vec<Payment>, RepoError> {
                let sql = format!(
                    "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reservation_id = $1 \
                     ORDER BY created_at ASC"
                );
                let rows: Vec<DbPayment> = sqlx::query_as(&sql)
                    .bind(types::uuid(reservation_id.into_uuid()))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;

                rows.into_iter().map(DbPayment::into_domain).collect()
            }

            // ─────────────────────────────────────────────────────────────────
            // Provider event dedup
            // ─────────────────────────────────────────────────────────────────

            async fn is_event_processed(&self, event_id: &str) -> Result<bool, RepoError> {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT event_id FROM provider_events WHERE event_id = $1")
                        .bind(event_id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?;
                Ok(row.is_some())
            }

            async fn mark_event_processed(
                &self,
                event_id: &str,
                event_type: &str,
            ) -> Result<bool, RepoError> {
                let result = sqlx::query(
                    "INSERT INTO provider_events (event_id, event_type, processed_at) \
                     VALUES ($1, $2, $3) ON CONFLICT (event_id) DO NOTHING",
                )
                .bind(event_id)
                .bind(event_type)
                .bind(types::time(Utc::now()))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(result.rows_affected() == 1)
            }

            // ─────────────────────────────────────────────────────────────────
            // Audit & notifications
            // ─────────────────────────────────────────────────────────────────

            async fn append_audit(&self, entry: AuditEntry) -> Result<(), RepoError> {
                sqlx::query(
                    "INSERT INTO audit_log (reservation_id, actor, action, detail, created_at) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(types::uuid(entry.reservation_id.into_uuid()))
                .bind(&entry.actor)
                .bind(&entry.action)
                .bind(types::json(&entry.detail))
                .bind(types::time(entry.created_at))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(())
            }

            async fn list_audit(
                &self,
                reservation_id: ReservationId,
            ) -> Result<Vec<AuditEntry>, RepoError> {
                let rows: Vec<DbAuditEntry> = sqlx::query_as(
                    "SELECT reservation_id, actor, action, detail, created_at FROM audit_log \
                     WHERE reservation_id = $1 ORDER BY id ASC",
                )
                .bind(types::uuid(reservation_id.into_uuid()))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

                rows.into_iter().map(DbAuditEntry::into_domain).collect()
            }

            async fn enqueue_domain_event(&self, event: &DomainEvent) -> Result<(), RepoError> {
                let payload = serde_json::to_value(event)
                    .map_err(|e| RepoError::Database(e.to_string()))?;
                sqlx::query(
                    "INSERT INTO domain_events (id, reservation_id, event_type, payload, status, \
                     created_at) VALUES ($1, $2, $3, $4, 'PENDING', $5)",
                )
                .bind(types::uuid(uuid::Uuid::new_v4()))
                .bind(types::uuid(event.reservation_id().into_uuid()))
                .bind(event.event_type())
                .bind(types::json(&payload))
                .bind(types::time(Utc::now()))
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(())
            }
        }
    };
}

pub(crate) use impl_repository;
