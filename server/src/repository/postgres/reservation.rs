use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::rows::{
    self, AttendeeRow, CouponRow, PaymentRow, ReservationRow, ATTENDEE_COLUMNS, COUPON_COLUMNS,
    PAYMENT_COLUMNS, RESERVATION_COLUMNS,
};
use super::{map_db_error, ConnectionPool};
use crate::models::attendee::AttendeeCredential;
use crate::models::coupon::{Coupon, CouponState};
use crate::models::payment::{Payment, PaymentState};
use crate::models::reservation::{NewReservation, Reservation, ReservationState, Transition};
use crate::repository::{
    AppliedCoupon, BookingRecord, CouponOutcome, ReservationRepository,
};
use crate::services::pricing::{self, CouponError};
use crate::utils::error::{AppError, AppResult};

const ACTIVE_STATES: &str = "('pending', 'confirmed', 'in_progress')";

pub struct ReservationRepositoryImpl {
    db: ConnectionPool,
}

impl ReservationRepositoryImpl {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

pub(super) async fn lock_reservation(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
) -> AppResult<Reservation> {
    let row: Option<ReservationRow> = sqlx::query_as(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
    ))
    .bind(reservation_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Reservation::try_from)
        .transpose()?
        .ok_or_else(|| AppError::NotFound(format!("Reservation '{reservation_id}' was not found")))
}

pub(super) async fn update_state(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
    state: ReservationState,
) -> AppResult<Reservation> {
    let row: ReservationRow = sqlx::query_as(&format!(
        "UPDATE reservations SET state = $2, updated_at = NOW() WHERE id = $1 \
         RETURNING {RESERVATION_COLUMNS}"
    ))
    .bind(reservation_id)
    .bind(state.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(map_db_error)?;

    Reservation::try_from(row)
}

pub(super) async fn record_cancellation(
    tx: &mut Transaction<'_, Postgres>,
    reservation_id: Uuid,
    reason: &str,
    cancelled_by: Option<Uuid>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO cancellations (id, reservation_id, reason, cancelled_by) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(reservation_id)
    .bind(reason)
    .bind(cancelled_by)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Locks the requested coupon and claims it when it can be redeemed. A
/// concurrent booking that claimed it first is seen once its transaction
/// commits, so the loser gets `AlreadyUsed` and pays full price. Coupon
/// problems are returned as the outcome, never as an error.
async fn claim_coupon(
    tx: &mut Transaction<'_, Postgres>,
    booking: &NewReservation,
    code: &str,
) -> AppResult<(Option<Uuid>, CouponOutcome)> {
    let row: Option<CouponRow> = sqlx::query_as(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
    ))
    .bind(code)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_db_error)?;

    let Some(coupon) = row.map(Coupon::try_from).transpose()? else {
        return Ok((None, Err(CouponError::NotFound)));
    };
    let discount =
        match pricing::apply_coupon(&coupon, booking.owner_id, booking.cost, booking.today) {
            Ok(discount) => discount,
            Err(reason) => return Ok((None, Err(reason))),
        };

    let claimed = sqlx::query(
        "UPDATE coupons SET state = $2 \
         WHERE id = $1 AND state = 'active' AND reservation_id IS NULL",
    )
    .bind(coupon.id)
    .bind(CouponState::Utilized.as_str())
    .execute(&mut **tx)
    .await
    .map_err(map_db_error)?;
    if claimed.rows_affected() != 1 {
        return Ok((None, Err(CouponError::AlreadyUsed)));
    }

    Ok((
        Some(coupon.id),
        Ok(AppliedCoupon {
            code: coupon.code,
            discount,
        }),
    ))
}

impl ReservationRepositoryImpl {
    async fn transition_with(
        &self,
        reservation_id: Uuid,
        transition: Transition,
        cancellation: Option<(&str, Option<Uuid>)>,
    ) -> AppResult<Reservation> {
        let mut tx = self.db.begin().await?;
        let current = lock_reservation(&mut tx, reservation_id).await?;
        let next = current.state.apply(transition)?;
        let updated = update_state(&mut tx, reservation_id, next).await?;
        if let Some((reason, cancelled_by)) = cancellation {
            record_cancellation(&mut tx, reservation_id, reason, cancelled_by).await?;
        }
        tx.commit().await.map_err(map_db_error)?;
        Ok(updated)
    }
}

#[async_trait]
impl ReservationRepository for ReservationRepositoryImpl {
    async fn find_active_on(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<Reservation>> {
        let found: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE resource_id = $1 AND reservation_date = $2 AND state IN {ACTIVE_STATES} \
             ORDER BY start_time"
        ))
        .bind(resource_id)
        .bind(date)
        .fetch_all(self.db.inner_ref())
        .await?;

        rows::reservations(found)
    }

    async fn find_on(&self, resource_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>> {
        let found: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE resource_id = $1 AND reservation_date = $2 ORDER BY start_time"
        ))
        .bind(resource_id)
        .bind(date)
        .fetch_all(self.db.inner_ref())
        .await?;

        rows::reservations(found)
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.db.inner_ref())
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    async fn create(&self, booking: NewReservation) -> AppResult<BookingRecord> {
        let mut tx = self.db.begin().await?;

        // Re-check inside the transaction. Two bookings that both pass it are
        // settled by the no-overlap constraint: the second insert waits for
        // the first to commit and then fails with an exclusion violation.
        let overlap: Option<(Uuid,)> = sqlx::query_as(&format!(
            "SELECT id FROM reservations \
             WHERE resource_id = $1 AND reservation_date = $2 AND state IN {ACTIVE_STATES} \
               AND start_time < $4 AND $3 < end_time \
             LIMIT 1"
        ))
        .bind(booking.resource_id)
        .bind(booking.date)
        .bind(booking.window.start)
        .bind(booking.window.end)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;
        if overlap.is_some() {
            return Err(AppError::Unavailable(
                "the requested window was booked concurrently".into(),
            ));
        }

        let (claimed, outcome) = match booking.coupon_code.as_deref() {
            Some(code) => {
                let (claimed, outcome) = claim_coupon(&mut tx, &booking, code).await?;
                (claimed, Some(outcome))
            }
            None => (None, None),
        };
        let cost = match &outcome {
            Some(Ok(applied)) => applied.discount.new_cost,
            _ => booking.cost,
        };
        let attendee_count = i32::try_from(booking.attendees.len())
            .map_err(|_| AppError::ValidationError("too many attendees".into()))?;

        let row: ReservationRow = sqlx::query_as(&format!(
            "INSERT INTO reservations \
             (id, code, resource_id, owner_id, discipline_id, reservation_date, \
              start_time, end_time, attendee_count, cost, state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(booking.id)
        .bind(&booking.code)
        .bind(booking.resource_id)
        .bind(booking.owner_id)
        .bind(booking.discipline_id)
        .bind(booking.date)
        .bind(booking.window.start)
        .bind(booking.window.end)
        .bind(attendee_count)
        .bind(cost)
        .bind(ReservationState::Pending.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let reservation = Reservation::try_from(row)?;

        if let Some(coupon_id) = claimed {
            sqlx::query("UPDATE coupons SET reservation_id = $2 WHERE id = $1")
                .bind(coupon_id)
                .bind(reservation.id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }

        let mut attendees = Vec::with_capacity(booking.attendees.len());
        for attendee in &booking.attendees {
            let row: AttendeeRow = sqlx::query_as(&format!(
                "INSERT INTO attendees (id, reservation_id, name, email) \
                 VALUES ($1, $2, $3, $4) RETURNING {ATTENDEE_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(reservation.id)
            .bind(attendee.name.trim())
            .bind(attendee.email.trim())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
            attendees.push(AttendeeCredential::from(row));
        }

        let row: PaymentRow = sqlx::query_as(&format!(
            "INSERT INTO payments (id, reservation_id, amount, method, state) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(reservation.id)
        .bind(cost)
        .bind(&booking.payment_method)
        .bind(PaymentState::Pending.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        let payment = Payment::try_from(row)?;

        tx.commit().await.map_err(map_db_error)?;

        Ok(BookingRecord {
            reservation,
            attendees,
            payment,
            coupon: outcome,
        })
    }

    async fn discard(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "UPDATE coupons SET state = 'active', reservation_id = NULL WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .execute(&mut *tx)
        .await?;
        // Attendees, payments and cancellations cascade.
        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transition(
        &self,
        reservation_id: Uuid,
        transition: Transition,
    ) -> AppResult<Reservation> {
        self.transition_with(reservation_id, transition, None).await
    }

    async fn confirm_free(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let mut tx = self.db.begin().await?;
        let current = lock_reservation(&mut tx, reservation_id).await?;
        if !current.cost.is_zero() {
            return Err(AppError::ValidationError(format!(
                "reservation '{}' still owes {}",
                current.code, current.cost
            )));
        }
        let next = current.state.apply(Transition::Confirm)?;
        let confirmed = update_state(&mut tx, reservation_id, next).await?;

        sqlx::query(
            "UPDATE payments SET state = $2, updated_at = NOW() WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .bind(PaymentState::Paid.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(confirmed)
    }

    async fn cancel(
        &self,
        reservation_id: Uuid,
        reason: &str,
        cancelled_by: Option<Uuid>,
    ) -> AppResult<Reservation> {
        self.transition_with(reservation_id, Transition::Cancel, Some((reason, cancelled_by)))
            .await
    }

    async fn complete_elapsed(&self, now: NaiveDateTime) -> AppResult<Vec<Reservation>> {
        let found: Vec<ReservationRow> = sqlx::query_as(&format!(
            "UPDATE reservations SET state = 'completed', updated_at = NOW() \
             WHERE state = 'in_progress' AND reservation_date + end_time <= $1 \
             RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(self.db.inner_ref())
        .await?;

        rows::reservations(found)
    }
}
