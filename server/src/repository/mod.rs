//! Storage seams. Every method that both reads and writes runs as a single
//! atomic unit in its implementation, so the services never hold a
//! check-then-act window open across two calls.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::attendee::{AttendeeCredential, MintedCredential};
use crate::models::coupon::{Coupon, CouponState, Discount, NewCoupon};
use crate::models::payment::{Payment, PaymentCallback};
use crate::models::reservation::{NewReservation, Reservation, Transition};
use crate::models::resource::Resource;
use crate::services::access::{Admission, AdmissionGate};
use crate::services::pricing::CouponError;
use crate::utils::error::AppResult;

pub mod memory;
pub mod postgres;

/// What a committed booking consists of.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub reservation: Reservation,
    pub attendees: Vec<AttendeeCredential>,
    pub payment: Payment,
    pub coupon: Option<CouponOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Discount,
}

pub type CouponOutcome = Result<AppliedCoupon, CouponError>;

/// Result of feeding one gateway callback to the store.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub payment: Payment,
    pub reservation: Reservation,
    /// `true` when the callback had already been applied and nothing changed.
    pub replayed: bool,
}

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    async fn find_by_id(&self, resource_id: Uuid) -> AppResult<Option<Resource>>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Reservations in `pending`, `confirmed` or `in_progress` for a court on a day.
    async fn find_active_on(&self, resource_id: Uuid, date: NaiveDate)
        -> AppResult<Vec<Reservation>>;
    /// Every reservation for a court on a day, ordered by start time.
    async fn find_on(&self, resource_id: Uuid, date: NaiveDate) -> AppResult<Vec<Reservation>>;
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Reservation>>;
    /// Re-checks availability and persists the reservation, its attendees,
    /// its pending payment and an optional coupon in one transaction.
    /// Fails with `Unavailable` if the window was taken concurrently and with
    /// `Conflict` if the reservation code is already in use.
    async fn create(&self, booking: NewReservation) -> AppResult<BookingRecord>;
    /// Undoes a `create` whose payment could not be initiated, releasing any
    /// coupon it consumed.
    async fn discard(&self, reservation_id: Uuid) -> AppResult<()>;
    async fn transition(&self, reservation_id: Uuid, transition: Transition)
        -> AppResult<Reservation>;
    /// Confirms a reservation that owes nothing and marks its payment settled.
    async fn confirm_free(&self, reservation_id: Uuid) -> AppResult<Reservation>;
    async fn cancel(
        &self,
        reservation_id: Uuid,
        reason: &str,
        cancelled_by: Option<Uuid>,
    ) -> AppResult<Reservation>;
    /// Completes every `in_progress` reservation whose end is at or before `now`.
    async fn complete_elapsed(&self, now: NaiveDateTime) -> AppResult<Vec<Reservation>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn attach_transaction(&self, payment_id: Uuid, transaction_id: &str)
        -> AppResult<Payment>;
    /// Applies a gateway callback. Replays of an already-applied status are
    /// reported with `replayed = true` and change nothing.
    async fn settle(&self, callback: &PaymentCallback) -> AppResult<Settlement>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Inserts all coupons or none; a duplicate code fails with `Conflict`.
    async fn insert_many(&self, coupons: Vec<NewCoupon>) -> AppResult<Vec<Coupon>>;
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>>;
    /// Switches a coupon between `active` and `inactive` under a row lock.
    async fn set_state(&self, code: &str, target: CouponState) -> AppResult<Coupon>;
}

#[async_trait]
pub trait AttendeeRepository: Send + Sync {
    async fn list_for_reservation(&self, reservation_id: Uuid)
        -> AppResult<Vec<AttendeeCredential>>;
    /// Stores all minted credentials, or none if any of the attendees was
    /// issued one in the meantime. Returns how many were stored.
    async fn store_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize>;
    /// Clears credentials that never reached their attendee so that a later
    /// issuance mints them again. A credential that was already used, or was
    /// replaced in the meantime, is left alone.
    async fn revoke_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize>;
    /// Looks up the credential by QR value and token hash, runs `gate`
    /// against it and, on success, marks attendance and begins the
    /// reservation if it is still `confirmed`.
    async fn admit(&self, qr_code: &str, token_hash: &str, gate: &AdmissionGate)
        -> AppResult<Admission>;
}

/// The full set of repositories a running service needs.
#[derive(Clone)]
pub struct Repositories {
    pub resources: Arc<dyn ResourceRepository>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub attendees: Arc<dyn AttendeeRepository>,
}

impl Repositories {
    pub fn postgres(pool: postgres::ConnectionPool) -> Self {
        Self {
            resources: Arc::new(postgres::resource::ResourceRepositoryImpl::new(pool.clone())),
            reservations: Arc::new(postgres::reservation::ReservationRepositoryImpl::new(
                pool.clone(),
            )),
            payments: Arc::new(postgres::payment::PaymentRepositoryImpl::new(pool.clone())),
            coupons: Arc::new(postgres::coupon::CouponRepositoryImpl::new(pool.clone())),
            attendees: Arc::new(postgres::attendee::AttendeeRepositoryImpl::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            resources: store.clone(),
            reservations: store.clone(),
            payments: store.clone(),
            coupons: store.clone(),
            attendees: store,
        }
    }
}
