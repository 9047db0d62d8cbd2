//! In-process store used by the test-suite and local demos. Every operation
//! runs to completion under one mutex, which gives the same all-or-nothing
//! behaviour the Postgres implementation gets from its transactions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::models::attendee::{AttendeeCredential, MintedCredential};
use crate::models::cancellation::Cancellation;
use crate::models::coupon::{Coupon, CouponState, NewCoupon};
use crate::models::payment::{Payment, PaymentCallback, PaymentState};
use crate::models::reservation::{NewReservation, Reservation, ReservationState, Transition};
use crate::models::resource::Resource;
use crate::repository::{
    AppliedCoupon, AttendeeRepository, BookingRecord, CouponOutcome, CouponRepository,
    PaymentRepository, ReservationRepository, ResourceRepository, Settlement,
};
use crate::services::access::{AccessDenial, Admission, AdmissionGate};
use crate::services::availability::window_is_free;
use crate::services::lifecycle::{plan_settlement, PAYMENT_FAILED_REASON};
use crate::services::pricing::{self, CouponError};
use crate::utils::error::{AppError, AppResult};

#[derive(Default)]
struct State {
    resources: HashMap<Uuid, Resource>,
    reservations: HashMap<Uuid, Reservation>,
    attendees: Vec<AttendeeCredential>,
    payments: HashMap<Uuid, Payment>,
    coupons: HashMap<String, Coupon>,
    cancellations: Vec<Cancellation>,
}

impl State {
    fn reservation_mut(&mut self, id: Uuid) -> AppResult<&mut Reservation> {
        self.reservations
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Reservation '{id}' was not found")))
    }

    fn record_cancellation(&mut self, reservation_id: Uuid, reason: &str, by: Option<Uuid>) {
        self.cancellations.push(Cancellation {
            id: Uuid::new_v4(),
            reservation_id,
            reason: reason.to_string(),
            cancelled_by: by,
            created_at: Utc::now(),
        });
    }

    fn redeem(&mut self, booking: &NewReservation, code: &str) -> CouponOutcome {
        let coupon = self.coupons.get_mut(code).ok_or(CouponError::NotFound)?;
        let discount = pricing::apply_coupon(coupon, booking.owner_id, booking.cost, booking.today)?;
        coupon.state = CouponState::Utilized;
        coupon.reservation_id = Some(booking.id);
        Ok(AppliedCoupon {
            code: coupon.code.clone(),
            discount,
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".into()))
    }

    pub fn insert_resource(&self, resource: Resource) -> AppResult<()> {
        self.lock()?.resources.insert(resource.id, resource);
        Ok(())
    }

    pub fn cancellations_for(&self, reservation_id: Uuid) -> AppResult<Vec<Cancellation>> {
        Ok(self
            .lock()?
            .cancellations
            .iter()
            .filter(|c| c.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    pub fn payments_for(&self, reservation_id: Uuid) -> AppResult<Vec<Payment>> {
        Ok(self
            .lock()?
            .payments
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect())
    }
}

fn sorted(mut reservations: Vec<Reservation>) -> Vec<Reservation> {
    reservations.sort_by_key(|r| r.start_time);
    reservations
}

#[async_trait]
impl ResourceRepository for MemoryStore {
    async fn find_by_id(&self, resource_id: Uuid) -> AppResult<Option<Resource>> {
        Ok(self.lock()?.resources.get(&resource_id).cloned())
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn find_active_on(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<Reservation>> {
        let state = self.lock()?;
        Ok(sorted(
            state
                .reservations
                .values()
                .filter(|r| r.resource_id == resource_id && r.date == date)
                .filter(|r| !r.state.is_terminal())
                .cloned()
                .collect(),
        ))
    }

    async fn find_on(&self, resource_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>> {
        let state = self.lock()?;
        Ok(sorted(
            state
                .reservations
                .values()
                .filter(|r| r.resource_id == resource_id && r.date == date)
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Reservation>> {
        Ok(self
            .lock()?
            .reservations
            .values()
            .find(|r| r.code == code)
            .cloned())
    }

    async fn create(&self, booking: NewReservation) -> AppResult<BookingRecord> {
        let mut state = self.lock()?;
        if state.reservations.values().any(|r| r.code == booking.code) {
            return Err(AppError::Conflict(format!(
                "reservation code '{}' is already in use",
                booking.code
            )));
        }
        let active: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.resource_id == booking.resource_id && r.date == booking.date)
            .cloned()
            .collect();
        if !window_is_free(&active, &booking.window, None) {
            return Err(AppError::Unavailable(
                "the window was booked concurrently".into(),
            ));
        }

        let coupon = booking
            .coupon_code
            .as_deref()
            .map(|code| state.redeem(&booking, code));
        let cost = match &coupon {
            Some(Ok(applied)) => applied.discount.new_cost,
            _ => booking.cost,
        };

        let now = Utc::now();
        let reservation = Reservation {
            id: booking.id,
            code: booking.code.clone(),
            resource_id: booking.resource_id,
            owner_id: booking.owner_id,
            discipline_id: booking.discipline_id,
            date: booking.date,
            start_time: booking.window.start,
            end_time: booking.window.end,
            attendee_count: i32::try_from(booking.attendees.len()).unwrap_or(i32::MAX),
            cost,
            state: ReservationState::Pending,
            created_at: now,
            updated_at: now,
        };
        let attendees: Vec<AttendeeCredential> = booking
            .attendees
            .iter()
            .map(|a| AttendeeCredential {
                id: Uuid::new_v4(),
                reservation_id: booking.id,
                name: a.name.trim().to_string(),
                email: a.email.trim().to_string(),
                qr_code: None,
                token_hash: None,
                attended: false,
                validated_at: None,
                created_at: now,
            })
            .collect();
        let payment = Payment {
            id: Uuid::new_v4(),
            reservation_id: booking.id,
            amount: cost,
            method: booking.payment_method.clone(),
            transaction_id: None,
            state: PaymentState::Pending,
            created_at: now,
            updated_at: now,
        };

        state.reservations.insert(reservation.id, reservation.clone());
        state.attendees.extend(attendees.iter().cloned());
        state.payments.insert(payment.id, payment.clone());

        Ok(BookingRecord {
            reservation,
            attendees,
            payment,
            coupon,
        })
    }

    async fn discard(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut state = self.lock()?;
        state.reservations.remove(&reservation_id);
        state.attendees.retain(|a| a.reservation_id != reservation_id);
        state.payments.retain(|_, p| p.reservation_id != reservation_id);
        for coupon in state.coupons.values_mut() {
            if coupon.reservation_id == Some(reservation_id) {
                coupon.reservation_id = None;
                coupon.state = CouponState::Active;
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        reservation_id: Uuid,
        transition: Transition,
    ) -> AppResult<Reservation> {
        let mut state = self.lock()?;
        let reservation = state.reservation_mut(reservation_id)?;
        reservation.state = reservation.state.apply(transition)?;
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }

    async fn confirm_free(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let mut state = self.lock()?;
        let reservation = state.reservation_mut(reservation_id)?;
        if !reservation.cost.is_zero() {
            return Err(AppError::ValidationError(format!(
                "reservation '{}' still owes {}",
                reservation.code, reservation.cost
            )));
        }
        reservation.state = reservation.state.apply(Transition::Confirm)?;
        reservation.updated_at = Utc::now();
        let confirmed = reservation.clone();

        for payment in state.payments.values_mut() {
            if payment.reservation_id == reservation_id {
                payment.state = PaymentState::Paid;
                payment.updated_at = Utc::now();
            }
        }
        Ok(confirmed)
    }

    async fn cancel(
        &self,
        reservation_id: Uuid,
        reason: &str,
        cancelled_by: Option<Uuid>,
    ) -> AppResult<Reservation> {
        let mut state = self.lock()?;
        let reservation = state.reservation_mut(reservation_id)?;
        reservation.state = reservation.state.apply(Transition::Cancel)?;
        reservation.updated_at = Utc::now();
        let cancelled = reservation.clone();
        state.record_cancellation(reservation_id, reason, cancelled_by);
        Ok(cancelled)
    }

    async fn complete_elapsed(&self, now: NaiveDateTime) -> AppResult<Vec<Reservation>> {
        let mut state = self.lock()?;
        let mut completed = Vec::new();
        for reservation in state.reservations.values_mut() {
            if reservation.state == ReservationState::InProgress && reservation.ends_at() <= now {
                reservation.state = reservation.state.apply(Transition::Complete)?;
                reservation.updated_at = Utc::now();
                completed.push(reservation.clone());
            }
        }
        Ok(completed)
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn attach_transaction(
        &self,
        payment_id: Uuid,
        transaction_id: &str,
    ) -> AppResult<Payment> {
        let mut state = self.lock()?;
        let payment = state
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| AppError::NotFound(format!("Payment '{payment_id}' was not found")))?;
        payment.transaction_id = Some(transaction_id.to_string());
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn settle(&self, callback: &PaymentCallback) -> AppResult<Settlement> {
        let mut state = self.lock()?;
        let payment = state
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(callback.transaction_id.as_str()))
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No payment for transaction '{}'",
                    callback.transaction_id
                ))
            })?;
        let reservation = state.reservation_mut(payment.reservation_id)?.clone();

        let plan = plan_settlement(&payment, reservation.state, callback)?;
        if plan.replayed {
            return Ok(Settlement {
                payment,
                reservation,
                replayed: true,
            });
        }
        let next_state = match plan.transition {
            Some(transition) => Some(reservation.state.apply(transition)?),
            None => None,
        };

        let now = Utc::now();
        let settled = state
            .payments
            .get_mut(&payment.id)
            .map(|p| {
                p.state = plan.payment_state;
                p.updated_at = now;
                p.clone()
            })
            .ok_or_else(|| AppError::InternalServerError("payment vanished mid-settlement".into()))?;

        let reservation = state.reservation_mut(payment.reservation_id)?;
        if let Some(next) = next_state {
            reservation.state = next;
            reservation.updated_at = now;
        }
        let reservation = reservation.clone();
        if plan.transition == Some(Transition::Cancel) {
            state.record_cancellation(reservation.id, PAYMENT_FAILED_REASON, None);
        }

        Ok(Settlement {
            payment: settled,
            reservation,
            replayed: false,
        })
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn insert_many(&self, coupons: Vec<NewCoupon>) -> AppResult<Vec<Coupon>> {
        let mut state = self.lock()?;
        let mut codes = std::collections::HashSet::new();
        for coupon in &coupons {
            if state.coupons.contains_key(&coupon.code) || !codes.insert(coupon.code.as_str()) {
                return Err(AppError::Conflict(format!(
                    "coupon code '{}' already exists",
                    coupon.code
                )));
            }
        }

        let now = Utc::now();
        let created: Vec<Coupon> = coupons
            .into_iter()
            .map(|new| Coupon {
                id: Uuid::new_v4(),
                code: new.code,
                kind: new.kind,
                magnitude: new.magnitude,
                expires_on: new.expires_on,
                owner_id: new.owner_id,
                state: CouponState::Active,
                reservation_id: None,
                created_at: now,
            })
            .collect();
        for coupon in &created {
            state.coupons.insert(coupon.code.clone(), coupon.clone());
        }
        Ok(created)
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
        Ok(self.lock()?.coupons.get(code).cloned())
    }

    async fn set_state(&self, code: &str, target: CouponState) -> AppResult<Coupon> {
        let mut state = self.lock()?;
        let coupon = state
            .coupons
            .get_mut(code)
            .ok_or_else(|| AppError::NotFound(format!("Coupon '{code}' was not found")))?;
        coupon.state = coupon.state.switch_to(target)?;
        Ok(coupon.clone())
    }
}

#[async_trait]
impl AttendeeRepository for MemoryStore {
    async fn list_for_reservation(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<Vec<AttendeeCredential>> {
        Ok(self
            .lock()?
            .attendees
            .iter()
            .filter(|a| a.reservation_id == reservation_id)
            .cloned()
            .collect())
    }

    async fn store_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize> {
        let mut state = self.lock()?;
        let all_open = minted.iter().all(|m| {
            state
                .attendees
                .iter()
                .any(|a| a.id == m.attendee_id && !a.is_issued())
        });
        if !all_open {
            return Ok(0);
        }
        for credential in minted {
            if let Some(attendee) = state
                .attendees
                .iter_mut()
                .find(|a| a.id == credential.attendee_id)
            {
                attendee.qr_code = Some(credential.qr_code.clone());
                attendee.token_hash = Some(credential.token_hash.clone());
            }
        }
        Ok(minted.len())
    }

    async fn revoke_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize> {
        let mut state = self.lock()?;
        let mut revoked = 0;
        for credential in minted {
            if let Some(attendee) = state.attendees.iter_mut().find(|a| {
                a.id == credential.attendee_id
                    && !a.attended
                    && a.qr_code.as_deref() == Some(credential.qr_code.as_str())
            }) {
                attendee.qr_code = None;
                attendee.token_hash = None;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn admit(
        &self,
        qr_code: &str,
        token_hash: &str,
        gate: &AdmissionGate,
    ) -> AppResult<Admission> {
        let mut state = self.lock()?;
        let index = state
            .attendees
            .iter()
            .position(|a| {
                a.qr_code.as_deref() == Some(qr_code) && a.token_hash.as_deref() == Some(token_hash)
            })
            .ok_or(AccessDenial::NotFound)?;
        let reservation_id = state.attendees[index].reservation_id;
        let reservation = state
            .reservations
            .get(&reservation_id)
            .cloned()
            .ok_or(AccessDenial::NotFound)?;

        gate.check(&state.attendees[index], &reservation)?;

        let attendee = &mut state.attendees[index];
        attendee.attended = true;
        attendee.validated_at = Some(gate.now);
        let credential = attendee.clone();

        let began = reservation.state == ReservationState::Confirmed;
        let reservation = if began {
            let reservation = state.reservation_mut(reservation_id)?;
            reservation.state = reservation.state.apply(Transition::Begin)?;
            reservation.updated_at = Utc::now();
            reservation.clone()
        } else {
            reservation
        };

        Ok(Admission {
            credential,
            reservation,
            began,
        })
    }
}
