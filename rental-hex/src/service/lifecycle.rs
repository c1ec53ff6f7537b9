//! Reservation lifecycle with soft payment warnings.
//!
//! Pickup and return are never blocked by money state. When the rental is
//! not fully paid or the deposit is not collected, the caller must pass an
//! explicit acknowledgement, which is written to the audit trail.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use rental_types::domain::{DomainEvent, NewReservation, ReservationAction};
use rental_types::{
    AppError, AuditResponse, GatewayFactory, ReservationDetails, ReservationId,
    ReservationRepository, Reservation, TransitionRequest, TransitionResponse, WarningsResponse,
};

use super::ServiceContext;
use super::deposit::DepositAuthorizationManager;

pub struct ReservationStateMachine<R, G> {
    ctx: Arc<ServiceContext<R, G>>,
    deposits: DepositAuthorizationManager<R, G>,
}

impl<R, G> Clone for ReservationStateMachine<R, G> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            deposits: self.deposits.clone(),
        }
    }
}

impl<R: ReservationRepository, G: GatewayFactory> ReservationStateMachine<R, G> {
    pub(crate) fn new(ctx: Arc<ServiceContext<R, G>>) -> Self {
        Self {
            deposits: DepositAuthorizationManager::new(ctx.clone()),
            ctx,
        }
    }

    /// Registers a reservation handed over by the booking flow.
    #[tracing::instrument(skip(self, req), fields(number = %req.number))]
    pub async fn create(&self, req: NewReservation) -> Result<Reservation, AppError> {
        let reservation = req.into_reservation()?;
        self.ctx.repo.create_reservation(&reservation).await?;
        info!(reservation_id = %reservation.id, "Reservation created");
        Ok(reservation)
    }

    pub async fn get(&self, id: ReservationId) -> Result<ReservationDetails, AppError> {
        let reservation = self.ctx.load(id).await?;
        let (payments, ledger) = self.ctx.ledger(id).await?;
        Ok(ReservationDetails {
            reservation,
            payments,
            ledger,
        })
    }

    /// Read-only preview of the handover warnings.
    pub async fn warnings(&self, id: ReservationId) -> Result<WarningsResponse, AppError> {
        let reservation = self.ctx.load(id).await?;
        let (_, ledger) = self.ctx.ledger(id).await?;
        Ok(WarningsResponse {
            warnings: reservation.warnings(&ledger),
            rental_balance: reservation.rental_balance(&ledger),
            ledger,
        })
    }

    pub async fn audit_trail(&self, id: ReservationId) -> Result<AuditResponse, AppError> {
        let entries = self.ctx.repo.list_audit(id).await?;
        Ok(AuditResponse { entries })
    }

    /// Applies a staff-initiated transition.
    ///
    /// Cancel first settles the deposit (see
    /// [`DepositAuthorizationManager::settle_for_cancellation`]); if that
    /// fails, the reservation keeps its status.
    #[tracing::instrument(skip(self, req), fields(reservation_id = %id, action = %req.action))]
    pub async fn transition(
        &self,
        id: ReservationId,
        req: TransitionRequest,
    ) -> Result<TransitionResponse, AppError> {
        let actor = req.actor.as_deref().unwrap_or("staff");
        let _guard = self.ctx.locks.acquire(id).await;
        let reservation = self.ctx.load(id).await?;

        let from = reservation.status;
        let to = req.action.target_from(from)?;

        let mut acknowledged = Vec::new();
        if req.action.checks_payment_warnings() {
            let (_, ledger) = self.ctx.ledger(id).await?;
            let warnings = reservation.warnings(&ledger);
            if !warnings.is_empty() && !req.acknowledge_warnings {
                return Err(AppError::AcknowledgementRequired(warnings));
            }
            acknowledged = warnings;
        }

        let (mut reservation, side_effect) = if req.action == ReservationAction::Cancel {
            let (settled, effect) = self
                .deposits
                .settle_for_cancellation(reservation, actor)
                .await?;
            (settled, Some(effect))
        } else {
            (reservation, None)
        };

        reservation.status = to;
        let saved = self
            .ctx
            .repo
            .save_reservation(&reservation, None)
            .await?
            .reservation;

        info!(%from, %to, "Reservation transitioned");
        self.ctx
            .emit(DomainEvent::ReservationStatusChanged {
                reservation_id: id,
                from,
                to,
            })
            .await;
        self.ctx
            .audit(
                id,
                actor,
                &format!("reservation.{}", req.action),
                json!({
                    "from": from,
                    "to": to,
                    "acknowledged_warnings": acknowledged,
                    "side_effect": side_effect,
                }),
            )
            .await;

        Ok(TransitionResponse {
            reservation: saved,
            acknowledged_warnings: acknowledged,
            side_effect,
        })
    }
}
