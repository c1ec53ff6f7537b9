//! Deposit authorization state and its reducer.
//!
//! `DepositState` is a projection: the only way to obtain a changed state is
//! [`reduce`], which folds one [`DepositEvent`] into the current state. Legal
//! edges:
//!
//! ```text
//! none -> pending -> { card_saved, authorized }
//! card_saved -> { authorized, released }
//! authorized -> { captured, released, failed }
//! ```
//!
//! Anything else is reported as [`Reduction::Ignored`] instead of an error,
//! because provider events arrive at least once and out of order.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

/// Days a provider keeps an uncaptured authorization hold.
pub const AUTHORIZATION_HOLD_DAYS: i64 = 7;

/// Lifecycle of the security-deposit hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    #[default]
    None,
    Pending,
    CardSaved,
    Authorized,
    Captured,
    Released,
    Failed,
}

impl DepositStatus {
    /// Captured, released and failed deposits accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositStatus::Captured | DepositStatus::Released | DepositStatus::Failed
        )
    }
}

impl AsRef<str> for DepositStatus {
    fn as_ref(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::CardSaved => "card_saved",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Released => "released",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "card_saved" => Ok(Self::CardSaved),
            "authorized" => Ok(Self::Authorized),
            "captured" => Ok(Self::Captured),
            "released" => Ok(Self::Released),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown deposit status: {other}"
            ))),
        }
    }
}

/// The deposit projection stored on a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
pub struct DepositState {
    status: DepositStatus,
    /// Provider intent currently backing the deposit.
    intent_ref: Option<String>,
    /// True while `intent_ref` is a card-saving setup intent rather than a hold.
    setup_intent: bool,
    #[schema(value_type = Option<String>)]
    hold_amount: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    captured_amount: Option<Decimal>,
    expires_at: Option<DateTime<Utc>>,
}

impl DepositState {
    /// Reconstructs a state from stored columns (for database reconstruction).
    pub fn from_parts(
        status: DepositStatus,
        intent_ref: Option<String>,
        setup_intent: bool,
        hold_amount: Option<Decimal>,
        captured_amount: Option<Decimal>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status,
            intent_ref,
            setup_intent,
            hold_amount,
            captured_amount,
            expires_at,
        }
    }

    pub fn status(&self) -> DepositStatus {
        self.status
    }

    pub fn intent_ref(&self) -> Option<&str> {
        self.intent_ref.as_deref()
    }

    pub fn is_setup_intent(&self) -> bool {
        self.setup_intent
    }

    /// Amount held (or requested, while pending).
    pub fn hold_amount(&self) -> Option<Decimal> {
        self.hold_amount
    }

    pub fn captured_amount(&self) -> Option<Decimal> {
        self.captured_amount
    }

    /// Provider-side expiry of the hold; only set once authorized.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Ensures `action` is allowed from one of `allowed`.
    pub fn require(&self, action: &str, allowed: &[DepositStatus]) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::InvalidState {
                action: action.to_string(),
                state: format!("deposit is {}", self.status),
            })
        }
    }
}

/// An observed fact about the deposit, from a caller or the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepositEvent {
    /// A hold (or, for far-future rentals, a card-saving setup) was requested.
    AuthorizationRequested {
        intent_ref: String,
        amount: Decimal,
        setup_intent: bool,
    },
    /// The customer's card was saved for a later off-session hold.
    CardSaved,
    /// The provider confirmed the hold.
    Authorized {
        intent_ref: String,
        amount: Decimal,
        confirmed_at: DateTime<Utc>,
    },
    Captured {
        amount: Decimal,
    },
    Released,
    /// The provider reported the hold as unusable during expiry reconciliation.
    Failed {
        reason: String,
    },
}

impl DepositEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DepositEvent::AuthorizationRequested { .. } => "authorization_requested",
            DepositEvent::CardSaved => "card_saved",
            DepositEvent::Authorized { .. } => "authorized",
            DepositEvent::Captured { .. } => "captured",
            DepositEvent::Released => "released",
            DepositEvent::Failed { .. } => "failed",
        }
    }
}

/// Result of folding one event into a deposit state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    Applied(DepositState),
    /// The event id was already applied.
    Duplicate,
    /// The event is not a legal edge from the current state.
    Ignored { reason: String },
}

/// Folds `event` into `current`.
///
/// `deposit_amount` is the reservation's configured deposit; a zero deposit
/// keeps the status at `none` whatever arrives. `already_applied` reports
/// whether the event id (or external reference) was seen before.
pub fn reduce(
    current: &DepositState,
    deposit_amount: Decimal,
    event: &DepositEvent,
    already_applied: bool,
) -> Reduction {
    use DepositStatus as S;

    if already_applied {
        return Reduction::Duplicate;
    }

    if deposit_amount.is_zero() {
        return Reduction::Ignored {
            reason: "reservation has no deposit".into(),
        };
    }

    let mut next = current.clone();
    match (current.status, event) {
        (
            S::None,
            DepositEvent::AuthorizationRequested {
                intent_ref,
                amount,
                setup_intent,
            },
        ) => {
            next.status = S::Pending;
            next.intent_ref = Some(intent_ref.clone());
            next.setup_intent = *setup_intent;
            next.hold_amount = Some(*amount);
        }
        (S::Pending, DepositEvent::CardSaved) => {
            next.status = S::CardSaved;
            next.intent_ref = None;
            next.setup_intent = false;
        }
        (
            S::Pending | S::CardSaved,
            DepositEvent::Authorized {
                intent_ref,
                amount,
                confirmed_at,
            },
        ) => {
            if current.status == S::Pending
                && !current.setup_intent
                && current.intent_ref.as_deref() != Some(intent_ref.as_str())
            {
                return Reduction::Ignored {
                    reason: format!("authorization for unknown intent {intent_ref}"),
                };
            }
            next.status = S::Authorized;
            next.intent_ref = Some(intent_ref.clone());
            next.setup_intent = false;
            next.hold_amount = Some(*amount);
            next.expires_at = Some(*confirmed_at + Duration::days(AUTHORIZATION_HOLD_DAYS));
        }
        (S::Authorized, DepositEvent::Captured { amount }) => {
            let held = current.hold_amount.unwrap_or(Decimal::ZERO);
            if *amount > held {
                return Reduction::Ignored {
                    reason: format!("capture of {amount} exceeds hold of {held}"),
                };
            }
            next.status = S::Captured;
            next.captured_amount = Some(*amount);
        }
        (S::Authorized | S::CardSaved, DepositEvent::Released) => {
            next.status = S::Released;
        }
        (S::Authorized, DepositEvent::Failed { .. }) => {
            next.status = S::Failed;
        }
        (status, event) => {
            return Reduction::Ignored {
                reason: format!("{} is not allowed while {}", event.name(), status),
            };
        }
    }

    Reduction::Applied(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn deposit() -> Decimal {
        Decimal::from(100)
    }

    fn at(day: u32) -> DateTime<Utc> {
        chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 3, day, 12, 0, 0).unwrap()
    }

    fn requested() -> DepositEvent {
        DepositEvent::AuthorizationRequested {
            intent_ref: "pi_1".into(),
            amount: deposit(),
            setup_intent: false,
        }
    }

    fn authorized() -> DepositEvent {
        DepositEvent::Authorized {
            intent_ref: "pi_1".into(),
            amount: deposit(),
            confirmed_at: at(1),
        }
    }

    /// Applies id-tagged events, deduplicating by id like the reconciler does.
    fn fold(events: &[(&str, DepositEvent)]) -> DepositState {
        let mut seen = HashSet::new();
        let mut state = DepositState::default();
        for (id, event) in events {
            let reduction = reduce(&state, deposit(), event, seen.contains(id));
            if let Reduction::Applied(next) = reduction {
                state = next;
                seen.insert(*id);
            }
        }
        state
    }

    fn expect_applied(reduction: Reduction) -> DepositState {
        match reduction {
            Reduction::Applied(state) => state,
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_request_then_authorize_sets_expiry() {
        let state = expect_applied(reduce(
            &DepositState::default(),
            deposit(),
            &requested(),
            false,
        ));
        assert_eq!(state.status(), DepositStatus::Pending);
        assert!(state.expires_at().is_none());

        let state = expect_applied(reduce(&state, deposit(), &authorized(), false));
        assert_eq!(state.status(), DepositStatus::Authorized);
        assert_eq!(state.expires_at(), Some(at(8)));
    }

    #[test]
    fn test_duplicate_event_is_rejected() {
        let state = fold(&[("evt_1", requested())]);
        assert_eq!(
            reduce(&state, deposit(), &requested(), true),
            Reduction::Duplicate
        );
    }

    #[test]
    fn test_zero_deposit_stays_none() {
        let reduction = reduce(&DepositState::default(), Decimal::ZERO, &requested(), false);
        assert!(matches!(reduction, Reduction::Ignored { .. }));
    }

    #[test]
    fn test_capture_from_pending_is_ignored() {
        let state = fold(&[("evt_1", requested())]);
        let reduction = reduce(
            &state,
            deposit(),
            &DepositEvent::Captured { amount: deposit() },
            false,
        );
        assert!(matches!(reduction, Reduction::Ignored { .. }));
    }

    #[test]
    fn test_capture_above_hold_is_ignored() {
        let state = fold(&[("evt_1", requested()), ("evt_2", authorized())]);
        let reduction = reduce(
            &state,
            deposit(),
            &DepositEvent::Captured {
                amount: Decimal::from(150),
            },
            false,
        );
        assert!(matches!(reduction, Reduction::Ignored { .. }));
    }

    #[test]
    fn test_released_is_terminal() {
        let state = fold(&[
            ("evt_1", requested()),
            ("evt_2", authorized()),
            ("evt_3", DepositEvent::Released),
        ]);
        assert_eq!(state.status(), DepositStatus::Released);
        for event in [
            DepositEvent::Released,
            DepositEvent::Captured { amount: deposit() },
            authorized(),
            requested(),
        ] {
            assert!(matches!(
                reduce(&state, deposit(), &event, false),
                Reduction::Ignored { .. }
            ));
        }
    }

    #[test]
    fn test_failed_only_from_authorized() {
        let failed = DepositEvent::Failed {
            reason: "expired".into(),
        };
        let pending = fold(&[("evt_1", requested())]);
        assert!(matches!(
            reduce(&pending, deposit(), &failed, false),
            Reduction::Ignored { .. }
        ));

        let authorized_state = fold(&[("evt_1", requested()), ("evt_2", authorized())]);
        let state = expect_applied(reduce(&authorized_state, deposit(), &failed, false));
        assert_eq!(state.status(), DepositStatus::Failed);
    }

    #[test]
    fn test_card_saved_then_off_session_authorization() {
        let setup = DepositEvent::AuthorizationRequested {
            intent_ref: "seti_1".into(),
            amount: deposit(),
            setup_intent: true,
        };
        let off_session = DepositEvent::Authorized {
            intent_ref: "pi_9".into(),
            amount: deposit(),
            confirmed_at: at(20),
        };
        let state = fold(&[
            ("evt_1", setup),
            ("evt_2", DepositEvent::CardSaved),
            ("evt_3", off_session),
        ]);
        assert_eq!(state.status(), DepositStatus::Authorized);
        assert_eq!(state.intent_ref(), Some("pi_9"));
        assert_eq!(state.expires_at(), Some(at(27)));
    }

    #[test]
    fn test_authorization_for_foreign_intent_is_ignored() {
        let state = fold(&[("evt_1", requested())]);
        let foreign = DepositEvent::Authorized {
            intent_ref: "pi_other".into(),
            amount: deposit(),
            confirmed_at: at(1),
        };
        assert!(matches!(
            reduce(&state, deposit(), &foreign, false),
            Reduction::Ignored { .. }
        ));
    }

    #[test]
    fn test_reordered_and_duplicated_delivery_matches_causal_order() {
        let causal = fold(&[
            ("evt_1", requested()),
            ("evt_2", authorized()),
            ("evt_3", DepositEvent::Captured { amount: deposit() }),
        ]);

        // Capture arrives first, authorization is delivered twice, and a late
        // release arrives after the capture already settled the hold.
        let noisy = fold(&[
            ("evt_3", DepositEvent::Captured { amount: deposit() }),
            ("evt_1", requested()),
            ("evt_1", requested()),
            ("evt_2", authorized()),
            ("evt_2", authorized()),
            ("evt_3", DepositEvent::Captured { amount: deposit() }),
            ("evt_4", DepositEvent::Released),
        ]);

        assert_eq!(noisy.status(), DepositStatus::Captured);
        assert_eq!(noisy, causal);
    }

    #[test]
    fn test_require_reports_invalid_state() {
        let state = DepositState::default();
        let result = state.require("capture", &[DepositStatus::Authorized]);
        assert!(matches!(result, Err(DomainError::InvalidState { .. })));
    }
}
