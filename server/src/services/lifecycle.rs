//! Reservation lifecycle: booking, payment settlement, cancellation and
//! completion. Transitions themselves are defined on
//! [`ReservationState::apply`]; this service decides when to request them.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::attendee::{Attendee, AttendeeCredential};
use crate::models::payment::{
    CallbackStatus, Payment, PaymentCallback, PaymentState,
};
use crate::models::reservation::{
    NewReservation, Reservation, ReservationState, TimeWindow, Transition,
};
use crate::repository::{
    AppliedCoupon, AttendeeRepository, BookingRecord, PaymentRepository, ReservationRepository,
    ResourceRepository, Settlement,
};
use crate::services::availability::AvailabilityChecker;
use crate::services::clock::Clock;
use crate::services::credentials::{validate_attendees, CredentialIssuer};
use crate::services::payment_gateway::{PaymentGateway, PaymentRequest};
use crate::services::pricing;
use crate::utils::error::{AppError, AppResult};

const CODE_ATTEMPTS: usize = 10;
pub const PAYMENT_FAILED_REASON: &str = "payment failed";
const DEFAULT_CANCEL_REASON: &str = "cancelled on request";
const GATEWAY_METHOD: &str = "gateway";
const CREDENTIALS_ACTION: &str = "issue credentials for";

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub resource_id: Uuid,
    pub owner_id: Uuid,
    pub discipline_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attendees: Vec<Attendee>,
    pub attendee_count: Option<i32>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub reservation: Reservation,
    pub attendees: Vec<AttendeeCredential>,
    pub payment_url: Option<String>,
    pub coupon: Option<AppliedCoupon>,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub attendees: Vec<AttendeeCredential>,
}

/// What a payment callback does to a payment and its reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementPlan {
    pub payment_state: PaymentState,
    pub transition: Option<Transition>,
    pub replayed: bool,
}

/// Decides the effect of `callback` on `payment` whose reservation is in
/// `reservation_state`. Both repositories call this under their row locks.
pub fn plan_settlement(
    payment: &Payment,
    reservation_state: ReservationState,
    callback: &PaymentCallback,
) -> AppResult<SettlementPlan> {
    let target = callback.status.settles_to();
    if payment.state == target {
        return Ok(SettlementPlan {
            payment_state: target,
            transition: None,
            replayed: true,
        });
    }
    if payment.state != PaymentState::Pending {
        return Err(AppError::Conflict(format!(
            "payment for transaction '{}' was already settled as {}",
            callback.transaction_id,
            payment.state.as_str()
        )));
    }
    if callback.status == CallbackStatus::Completed && callback.amount != payment.amount {
        return Err(AppError::ExternalServiceError(format!(
            "callback amount {} does not match payment amount {}",
            callback.amount, payment.amount
        )));
    }

    // A reservation that already left `pending` (for instance cancelled by
    // its owner) keeps its state; only the payment is recorded.
    let transition = match (target, reservation_state) {
        (PaymentState::Paid, ReservationState::Pending) => Some(Transition::Confirm),
        (PaymentState::Failed, ReservationState::Pending) => Some(Transition::Cancel),
        _ => None,
    };
    Ok(SettlementPlan {
        payment_state: target,
        transition,
        replayed: false,
    })
}

fn reservation_code() -> String {
    let mut rng = rand::thread_rng();
    let letters: String = (0..3)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect();
    let digits: String = (0..3)
        .map(|_| char::from(rng.gen_range(b'0'..=b'9')))
        .collect();
    format!("{letters}{digits}")
}

fn fallback_code(now: NaiveDateTime) -> String {
    format!("RES{}", now.and_utc().timestamp())
}

pub struct ReservationService {
    resources: Arc<dyn ResourceRepository>,
    reservations: Arc<dyn ReservationRepository>,
    payments: Arc<dyn PaymentRepository>,
    attendees: Arc<dyn AttendeeRepository>,
    availability: Arc<AvailabilityChecker>,
    issuer: Arc<CredentialIssuer>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
}

impl ReservationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        reservations: Arc<dyn ReservationRepository>,
        payments: Arc<dyn PaymentRepository>,
        attendees: Arc<dyn AttendeeRepository>,
        availability: Arc<AvailabilityChecker>,
        issuer: Arc<CredentialIssuer>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resources,
            reservations,
            payments,
            attendees,
            availability,
            issuer,
            gateway,
            clock,
        }
    }

    /// Books a window. Under a race for the same window exactly one caller
    /// wins; the others receive `Unavailable`.
    #[instrument(skip(self, request), fields(resource = %request.resource_id, date = %request.date))]
    pub async fn book(&self, request: BookingRequest) -> AppResult<BookingOutcome> {
        let window = TimeWindow::new(request.start_time, request.end_time)?;
        validate_attendees(&request.attendees, request.attendee_count)?;
        let today = self.clock.today();
        if request.date < today {
            return Err(AppError::ValidationError(
                "reservations cannot be made for past dates".into(),
            ));
        }

        let resource = self
            .resources
            .find_by_id(request.resource_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Court '{}' was not found", request.resource_id))
            })?;
        if !resource.is_bookable() {
            return Err(AppError::ValidationError(format!(
                "Court '{}' is {} and cannot be booked",
                resource.name,
                resource.state.as_str()
            )));
        }
        if !resource.covers(&window) {
            return Err(AppError::ValidationError(format!(
                "bookings must fall between {} and {}",
                resource.opening_time, resource.closing_time
            )));
        }
        if !self
            .availability
            .is_available(resource.id, request.date, &window, None)
            .await?
        {
            return Err(unavailable(&request.date, &window));
        }

        let coupon_code = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_uppercase);

        let booking = NewReservation {
            id: Uuid::new_v4(),
            code: String::new(),
            resource_id: resource.id,
            owner_id: request.owner_id,
            discipline_id: request.discipline_id,
            date: request.date,
            window,
            cost: pricing::price(&resource, &window),
            attendees: request.attendees,
            coupon_code,
            payment_method: GATEWAY_METHOD.to_string(),
            today,
        };
        let record = self.persist(booking).await?;

        let mut warnings = Vec::new();
        let coupon = match record.coupon.clone() {
            Some(Ok(applied)) => Some(applied),
            Some(Err(reason)) => {
                warn!(reservation = %record.reservation.code, %reason, "Coupon not applied");
                warnings.push(format!("Coupon was not applied: {reason}"));
                None
            }
            None => None,
        };

        let (reservation, payment_url) = self.start_payment(&record, &mut warnings).await?;
        let attendees = if reservation.state == ReservationState::Confirmed {
            self.attendees.list_for_reservation(reservation.id).await?
        } else {
            record.attendees
        };

        info!(
            reservation = %reservation.code,
            cost = %reservation.cost,
            state = %reservation.state,
            "Reservation booked"
        );
        Ok(BookingOutcome {
            reservation,
            attendees,
            payment_url,
            coupon,
            warnings,
        })
    }

    async fn persist(&self, mut booking: NewReservation) -> AppResult<BookingRecord> {
        let mut attempt = 0;
        loop {
            booking.code = if attempt < CODE_ATTEMPTS {
                reservation_code()
            } else {
                fallback_code(self.clock.now())
            };
            match self.reservations.create(booking.clone()).await {
                Err(AppError::Conflict(msg)) if attempt < CODE_ATTEMPTS => {
                    debug!(attempt, %msg, "Reservation code collision, retrying");
                    attempt += 1;
                }
                Err(AppError::Unavailable(_)) => {
                    return Err(unavailable(&booking.date, &booking.window));
                }
                other => return other,
            }
        }
    }

    /// Confirms free bookings on the spot; otherwise opens a gateway
    /// checkout, rolling the booking back if that fails.
    async fn start_payment(
        &self,
        record: &BookingRecord,
        warnings: &mut Vec<String>,
    ) -> AppResult<(Reservation, Option<String>)> {
        let reservation = &record.reservation;
        if reservation.cost.is_zero() {
            let confirmed = self.reservations.confirm_free(reservation.id).await?;
            // The booking is confirmed either way; credentials can be resent.
            if let Err(e) = self.issuer.issue(&confirmed).await {
                warn!(reservation = %confirmed.code, error = %e, "Credentials not issued");
                warnings.push(format!("Credentials were not delivered: {e}"));
            }
            return Ok((confirmed, None));
        }

        let request = PaymentRequest {
            reservation_id: reservation.id,
            reservation_code: reservation.code.clone(),
            amount: reservation.cost,
        };
        let attached = match self.gateway.initiate(&request).await {
            Ok(session) => self
                .payments
                .attach_transaction(record.payment.id, &session.transaction_id)
                .await
                .map(|_| session.payment_url),
            Err(e) => Err(AppError::ExternalServiceError(format!(
                "payment could not be initiated: {e}"
            ))),
        };

        match attached {
            Ok(url) => Ok((reservation.clone(), Some(url))),
            Err(e) => {
                error!(reservation = %reservation.code, error = %e, "Rolling back booking");
                if let Err(discard) = self.reservations.discard(reservation.id).await {
                    error!(
                        reservation = %reservation.code,
                        error = %discard,
                        "Failed to roll back booking"
                    );
                }
                Err(e)
            }
        }
    }

    /// Applies a gateway callback. Replays are acknowledged without effect,
    /// apart from finishing credential issuance a previous attempt may have
    /// left incomplete.
    #[instrument(skip(self, callback), fields(transaction = %callback.transaction_id))]
    pub async fn handle_payment_callback(&self, callback: PaymentCallback) -> AppResult<Settlement> {
        if callback.transaction_id.trim().is_empty() {
            return Err(AppError::ValidationError("transaction_id is required".into()));
        }

        let settlement = self.payments.settle(&callback).await?;
        if settlement.reservation.state == ReservationState::Confirmed {
            self.issuer.issue(&settlement.reservation).await?;
        }

        info!(
            reservation = %settlement.reservation.code,
            payment = settlement.payment.state.as_str(),
            state = %settlement.reservation.state,
            replayed = settlement.replayed,
            "Payment callback processed"
        );
        Ok(settlement)
    }

    /// Issues credentials to every attendee of a confirmed or in-progress
    /// reservation who does not hold one, typically after a failed delivery.
    #[instrument(skip(self))]
    pub async fn resend_credentials(&self, code: &str) -> AppResult<ReservationDetails> {
        let reservation = self.find(code).await?;
        if !matches!(
            reservation.state,
            ReservationState::Confirmed | ReservationState::InProgress
        ) {
            return Err(AppError::InvalidState {
                current: reservation.state,
                action: CREDENTIALS_ACTION,
            });
        }
        let issued = self.issuer.issue(&reservation).await?;
        info!(reservation = %reservation.code, issued, "Credentials resent");
        let attendees = self.attendees.list_for_reservation(reservation.id).await?;
        Ok(ReservationDetails {
            reservation,
            attendees,
        })
    }

    pub async fn details(&self, code: &str) -> AppResult<ReservationDetails> {
        let reservation = self.find(code).await?;
        let attendees = self.attendees.list_for_reservation(reservation.id).await?;
        Ok(ReservationDetails {
            reservation,
            attendees,
        })
    }

    pub async fn day_sheet(&self, resource_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>> {
        if self.resources.find_by_id(resource_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Court '{resource_id}' was not found"
            )));
        }
        self.reservations.find_on(resource_id, date).await
    }

    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        code: &str,
        reason: Option<String>,
        cancelled_by: Option<Uuid>,
    ) -> AppResult<Reservation> {
        let reservation = self.find(code).await?;
        reservation.state.apply(Transition::Cancel)?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

        let cancelled = self
            .reservations
            .cancel(reservation.id, &reason, cancelled_by)
            .await?;
        info!(reservation = %cancelled.code, %reason, "Reservation cancelled");
        Ok(cancelled)
    }

    /// Venue checkout.
    #[instrument(skip(self))]
    pub async fn checkout(&self, code: &str) -> AppResult<Reservation> {
        let reservation = self.find(code).await?;
        let completed = self
            .reservations
            .transition(reservation.id, Transition::Complete)
            .await?;
        info!(reservation = %completed.code, "Reservation completed at checkout");
        Ok(completed)
    }

    pub async fn complete_elapsed(&self) -> AppResult<Vec<Reservation>> {
        let completed = self.reservations.complete_elapsed(self.clock.now()).await?;
        if !completed.is_empty() {
            info!(count = completed.len(), "Completed elapsed reservations");
        }
        Ok(completed)
    }

    async fn find(&self, code: &str) -> AppResult<Reservation> {
        self.reservations
            .find_by_code(code.trim())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation '{code}' was not found")))
    }
}

fn unavailable(date: &NaiveDate, window: &TimeWindow) -> AppError {
    AppError::Unavailable(format!(
        "The court is not available on {date} between {} and {}",
        window.start, window.end
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn payment(state: PaymentState) -> Payment {
        Payment {
            id: Uuid::new_v4(),
            reservation_id: Uuid::new_v4(),
            amount: dec!(150.00),
            method: GATEWAY_METHOD.into(),
            transaction_id: Some("txn-1".into()),
            state,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn callback(status: CallbackStatus, amount: rust_decimal::Decimal) -> PaymentCallback {
        PaymentCallback {
            transaction_id: "txn-1".into(),
            status,
            amount,
        }
    }

    #[test]
    fn test_completed_callback_confirms_pending() {
        let plan = plan_settlement(
            &payment(PaymentState::Pending),
            ReservationState::Pending,
            &callback(CallbackStatus::Completed, dec!(150)),
        )
        .unwrap();
        assert_eq!(plan.payment_state, PaymentState::Paid);
        assert_eq!(plan.transition, Some(Transition::Confirm));
        assert!(!plan.replayed);
    }

    #[test]
    fn test_failed_and_cancelled_callbacks_cancel() {
        for status in [CallbackStatus::Failed, CallbackStatus::Cancelled] {
            let plan = plan_settlement(
                &payment(PaymentState::Pending),
                ReservationState::Pending,
                &callback(status, dec!(150)),
            )
            .unwrap();
            assert_eq!(plan.payment_state, PaymentState::Failed);
            assert_eq!(plan.transition, Some(Transition::Cancel));
        }
    }

    #[test]
    fn test_replay_is_a_no_op() {
        let plan = plan_settlement(
            &payment(PaymentState::Paid),
            ReservationState::Confirmed,
            &callback(CallbackStatus::Completed, dec!(150)),
        )
        .unwrap();
        assert!(plan.replayed);
        assert_eq!(plan.transition, None);
    }

    #[test]
    fn test_contradicting_callback_is_a_conflict() {
        let result = plan_settlement(
            &payment(PaymentState::Paid),
            ReservationState::Confirmed,
            &callback(CallbackStatus::Failed, dec!(150)),
        );
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_amount_mismatch_is_external_error() {
        let result = plan_settlement(
            &payment(PaymentState::Pending),
            ReservationState::Pending,
            &callback(CallbackStatus::Completed, dec!(15)),
        );
        assert!(matches!(result, Err(AppError::ExternalServiceError(_))));
    }

    #[test]
    fn test_payment_after_owner_cancelled_leaves_reservation() {
        let plan = plan_settlement(
            &payment(PaymentState::Pending),
            ReservationState::Cancelled,
            &callback(CallbackStatus::Completed, dec!(150.00)),
        )
        .unwrap();
        assert_eq!(plan.payment_state, PaymentState::Paid);
        assert_eq!(plan.transition, None);
    }

    #[test]
    fn test_reservation_code_shape() {
        for _ in 0..50 {
            let code = reservation_code();
            assert_eq!(code.len(), 6);
            assert!(code[..3].chars().all(|c| c.is_ascii_uppercase()));
            assert!(code[3..].chars().all(|c| c.is_ascii_digit()));
        }
        let now = NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(fallback_code(now), "RES1780300800");
    }
}
