//! Venue admission: one scan of a QR + token pair admits one attendee once.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, instrument};

use crate::models::attendee::AttendeeCredential;
use crate::models::reservation::{Reservation, ReservationState};
use crate::repository::AttendeeRepository;
use crate::services::clock::Clock;
use crate::services::credentials::hash_token;
use crate::utils::error::{AppError, AppResult};

pub const DEFAULT_GRACE_MINUTES: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenial {
    #[error("No credential matches this QR code and token")]
    NotFound,
    #[error("This credential has already been used")]
    AlreadyUsed,
    #[error("The reservation is {0}")]
    InvalidState(ReservationState),
    #[error("The reservation is for {scheduled}, not today")]
    WrongDate { scheduled: NaiveDate },
    #[error("Admission is only possible between {opens} and {closes}")]
    OutsideWindow {
        opens: NaiveDateTime,
        closes: NaiveDateTime,
    },
}

impl AccessDenial {
    pub fn code(&self) -> &'static str {
        match self {
            AccessDenial::NotFound => "NOT_FOUND",
            AccessDenial::AlreadyUsed => "ALREADY_USED",
            AccessDenial::InvalidState(_) => "INVALID_STATE",
            AccessDenial::WrongDate { .. } => "WRONG_DATE",
            AccessDenial::OutsideWindow { .. } => "OUTSIDE_WINDOW",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AccessDenial::InvalidState(current) => Some(json!({ "current_state": current })),
            AccessDenial::WrongDate { scheduled } => Some(json!({ "scheduled_date": scheduled })),
            AccessDenial::OutsideWindow { opens, closes } => {
                Some(json!({ "opens_at": opens, "closes_at": closes }))
            }
            AccessDenial::NotFound | AccessDenial::AlreadyUsed => None,
        }
    }
}

/// The checks a found credential must pass, evaluated at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionGate {
    pub now: NaiveDateTime,
    pub grace: Duration,
}

impl AdmissionGate {
    pub fn new(now: NaiveDateTime, grace: Duration) -> Self {
        Self { now, grace }
    }

    /// Gates run cheapest and most specific first; the first failure wins.
    pub fn check(
        &self,
        credential: &AttendeeCredential,
        reservation: &Reservation,
    ) -> Result<(), AccessDenial> {
        if credential.attended {
            return Err(AccessDenial::AlreadyUsed);
        }
        if !matches!(
            reservation.state,
            ReservationState::Confirmed | ReservationState::InProgress
        ) {
            return Err(AccessDenial::InvalidState(reservation.state));
        }
        if self.now.date() != reservation.date {
            return Err(AccessDenial::WrongDate {
                scheduled: reservation.date,
            });
        }
        let opens = reservation.starts_at() - self.grace;
        let closes = reservation.ends_at() + self.grace;
        if self.now < opens || self.now > closes {
            return Err(AccessDenial::OutsideWindow { opens, closes });
        }
        Ok(())
    }
}

/// A successful admission.
#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub credential: AttendeeCredential,
    pub reservation: Reservation,
    /// Whether this scan moved the reservation into `in_progress`.
    pub began: bool,
}

pub struct AccessVerifier {
    attendees: Arc<dyn AttendeeRepository>,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl AccessVerifier {
    pub fn new(
        attendees: Arc<dyn AttendeeRepository>,
        clock: Arc<dyn Clock>,
        grace_minutes: i64,
    ) -> Self {
        Self {
            attendees,
            clock,
            grace: Duration::minutes(grace_minutes),
        }
    }

    #[instrument(skip(self, token))]
    pub async fn verify(&self, qr_code: &str, token: &str) -> AppResult<Admission> {
        let qr_code = qr_code.trim();
        let token = token.trim();
        if qr_code.is_empty() || token.is_empty() {
            return Err(AppError::ValidationError(
                "both qr_code and token are required".into(),
            ));
        }

        let gate = AdmissionGate::new(self.clock.now(), self.grace);
        let admission = self
            .attendees
            .admit(qr_code, &hash_token(token), &gate)
            .await?;

        info!(
            reservation = %admission.reservation.code,
            attendee = %admission.credential.id,
            began = admission.began,
            "Attendee admitted"
        );
        Ok(admission)
    }
}
