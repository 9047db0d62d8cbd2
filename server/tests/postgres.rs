//! Repository tests against a live PostgreSQL. Each test gets a fresh
//! database with the migrations applied:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/courts cargo test --features postgres-tests
//! ```
#![cfg(feature = "postgres-tests")]

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use common::{at, booking_request, t, today, RecordingNotifier, StubGateway};
use court_booking_server::models::coupon::{CouponState, DiscountKind, NewCoupon};
use court_booking_server::models::payment::{CallbackStatus, PaymentCallback};
use court_booking_server::models::reservation::ReservationState;
use court_booking_server::repository::postgres::ConnectionPool;
use court_booking_server::repository::Repositories;
use court_booking_server::services::access::{AccessDenial, DEFAULT_GRACE_MINUTES};
use court_booking_server::services::clock::FixedClock;
use court_booking_server::services::lifecycle::BookingRequest;
use court_booking_server::state::AppState;
use court_booking_server::utils::error::AppError;

struct Court {
    pool: PgPool,
    state: AppState,
    gateway: Arc<StubGateway>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FixedClock>,
    id: Uuid,
}

impl Court {
    async fn open(pool: PgPool) -> Self {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO resources (id, name, opening_time, closing_time, hourly_rate, state) \
             VALUES ($1, $2, $3, $4, $5, 'available')",
        )
        .bind(id)
        .bind("Cancha Central")
        .bind(t(6, 0))
        .bind(t(23, 0))
        .bind(dec!(100.00))
        .execute(&pool)
        .await
        .unwrap();

        let gateway = Arc::new(StubGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(FixedClock::new(at(8, 0)));
        let state = AppState::new(
            Repositories::postgres(ConnectionPool::new(pool.clone())),
            gateway.clone(),
            notifier.clone(),
            clock.clone(),
            DEFAULT_GRACE_MINUTES,
        );
        Self {
            pool,
            state,
            gateway,
            notifier,
            clock,
            id,
        }
    }

    fn request(&self, start: NaiveTime, end: NaiveTime) -> BookingRequest {
        booking_request(self.id, start, end, 1)
    }

    async fn coupon(&self, code: &str, kind: DiscountKind, magnitude: Decimal) {
        self.state
            .coupons
            .create(NewCoupon {
                code: code.into(),
                kind,
                magnitude,
                expires_on: None,
                owner_id: None,
            })
            .await
            .unwrap();
    }

    async fn count(&self, table: &str, reservation_id: Uuid) -> i64 {
        sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {table} WHERE reservation_id = $1"
        ))
        .bind(reservation_id)
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }
}

#[sqlx::test]
async fn test_same_window_race_has_one_winner(pool: PgPool) {
    let court = Court::open(pool).await;
    let mut handles = Vec::new();
    for i in 0..8 {
        let service = court.state.reservations.clone();
        let request = court.request(t(9 + (i % 2), 30), t(11, 0));
        handles.push(tokio::spawn(async move { service.book(request).await }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(AppError::Unavailable(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(won, 1);
    let sheet = court
        .state
        .reservations
        .day_sheet(court.id, today())
        .await
        .unwrap();
    assert_eq!(sheet.len(), 1);
}

#[sqlx::test]
async fn test_disjoint_windows_book_concurrently(pool: PgPool) {
    let court = Court::open(pool).await;
    let mut handles = Vec::new();
    for hour in 8..20 {
        let service = court.state.reservations.clone();
        let request = court.request(t(hour, 0), t(hour + 1, 0));
        handles.push(tokio::spawn(async move { service.book(request).await }));
    }

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.reservation.state, ReservationState::Pending);
    }
    let sheet = court
        .state
        .reservations
        .day_sheet(court.id, today())
        .await
        .unwrap();
    assert_eq!(sheet.len(), 12);
}

#[sqlx::test]
async fn test_shared_coupon_race_books_losers_at_full_price(pool: PgPool) {
    let court = Court::open(pool).await;
    court.coupon("SHARED", DiscountKind::Fixed, dec!(40)).await;

    let mut handles = Vec::new();
    for hour in 10..16 {
        let service = court.state.reservations.clone();
        let mut request = court.request(t(hour, 0), t(hour + 1, 0));
        request.coupon_code = Some("SHARED".into());
        handles.push(tokio::spawn(async move { service.book(request).await }));
    }

    let mut discounted = Vec::new();
    let mut full_price = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.coupon.is_some() {
            assert_eq!(outcome.reservation.cost, dec!(60.00));
            discounted.push(outcome.reservation.id);
        } else {
            assert_eq!(outcome.reservation.cost, dec!(100.00));
            assert_eq!(outcome.warnings.len(), 1);
            full_price += 1;
        }
    }
    assert_eq!(discounted.len(), 1);
    assert_eq!(full_price, 5);

    let check = court.state.coupons.validate("SHARED", None).await.unwrap();
    let coupon = check.coupon.unwrap();
    assert_eq!(coupon.state, CouponState::Utilized);
    assert_eq!(coupon.reservation_id, Some(discounted[0]));
}

#[sqlx::test]
async fn test_double_scan_admits_once(pool: PgPool) {
    let court = Court::open(pool).await;
    court.coupon("COMP", DiscountKind::Percentage, dec!(100)).await;
    let mut request = court.request(t(10, 0), t(11, 0));
    request.coupon_code = Some("COMP".into());
    let outcome = court.state.reservations.book(request).await.unwrap();
    assert_eq!(outcome.reservation.state, ReservationState::Confirmed);
    let delivery = court
        .notifier
        .for_reservation(&outcome.reservation.code)
        .remove(0);
    court.clock.set(at(10, 5));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let verifier = court.state.access.clone();
        let qr = delivery.qr_code.clone();
        let token = delivery.token.clone();
        handles.push(tokio::spawn(async move { verifier.verify(&qr, &token).await }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(admission) => {
                admitted += 1;
                assert!(admission.began);
                assert_eq!(admission.reservation.state, ReservationState::InProgress);
            }
            Err(AppError::AccessDenied(AccessDenial::AlreadyUsed)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(admitted, 1);
}

#[sqlx::test]
async fn test_callback_replay_is_idempotent(pool: PgPool) {
    let court = Court::open(pool).await;
    let outcome = court
        .state
        .reservations
        .book(court.request(t(10, 0), t(11, 0)))
        .await
        .unwrap();
    let paid = PaymentCallback {
        transaction_id: court.gateway.last_transaction(),
        status: CallbackStatus::Completed,
        amount: dec!(100.00),
    };

    let first = court
        .state
        .reservations
        .handle_payment_callback(paid.clone())
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.reservation.state, ReservationState::Confirmed);

    let replay = court
        .state
        .reservations
        .handle_payment_callback(paid.clone())
        .await
        .unwrap();
    assert!(replay.replayed);
    assert_eq!(court.notifier.count(), 1);
    assert_eq!(court.count("payments", outcome.reservation.id).await, 1);

    let contradicting = PaymentCallback {
        status: CallbackStatus::Failed,
        ..paid
    };
    assert!(matches!(
        court
            .state
            .reservations
            .handle_payment_callback(contradicting)
            .await,
        Err(AppError::Conflict(_))
    ));
}

#[sqlx::test]
async fn test_gateway_failure_discards_booking_and_releases_coupon(pool: PgPool) {
    let court = Court::open(pool).await;
    court.coupon("HALF", DiscountKind::Percentage, dec!(50)).await;
    court.gateway.fail.store(true, Ordering::SeqCst);

    let mut request = court.request(t(10, 0), t(11, 0));
    request.coupon_code = Some("HALF".into());
    let result = court.state.reservations.book(request).await;
    assert!(matches!(result, Err(AppError::ExternalServiceError(_))));

    let sheet = court
        .state
        .reservations
        .day_sheet(court.id, today())
        .await
        .unwrap();
    assert!(sheet.is_empty());
    let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendees")
        .fetch_one(&court.pool)
        .await
        .unwrap();
    assert_eq!(orphans, 0);
    let check = court.state.coupons.validate("HALF", None).await.unwrap();
    assert!(check.valid);
    assert_eq!(check.coupon.unwrap().reservation_id, None);

    court.gateway.fail.store(false, Ordering::SeqCst);
    let mut request = court.request(t(10, 0), t(11, 0));
    request.coupon_code = Some("HALF".into());
    let outcome = court.state.reservations.book(request).await.unwrap();
    assert_eq!(outcome.reservation.cost, dec!(50.00));
}

#[sqlx::test]
async fn test_undelivered_credentials_are_reissued(pool: PgPool) {
    let court = Court::open(pool).await;
    court.coupon("COMP", DiscountKind::Percentage, dec!(100)).await;
    let mut request = court.request(t(10, 0), t(11, 0));
    request.coupon_code = Some("COMP".into());
    court.notifier.fail.store(true, Ordering::SeqCst);

    let outcome = court.state.reservations.book(request).await.unwrap();
    assert_eq!(outcome.reservation.state, ReservationState::Confirmed);
    assert!(outcome.attendees.iter().all(|a| !a.is_issued()));

    court.notifier.fail.store(false, Ordering::SeqCst);
    let details = court
        .state
        .reservations
        .resend_credentials(&outcome.reservation.code)
        .await
        .unwrap();
    assert!(details.attendees.iter().all(|a| a.is_issued()));
    assert_eq!(court.count("attendees", outcome.reservation.id).await, 1);
    assert_eq!(
        court.notifier.for_reservation(&outcome.reservation.code).len(),
        1
    );
}

#[sqlx::test]
async fn test_token_hash_is_unique(pool: PgPool) {
    let court = Court::open(pool).await;
    for hour in [10, 12] {
        court
            .state
            .reservations
            .book(court.request(t(hour, 0), t(hour + 1, 0)))
            .await
            .unwrap();
    }
    let hash = "a".repeat(64);
    let result = sqlx::query("UPDATE attendees SET token_hash = $1")
        .bind(&hash)
        .execute(&court.pool)
        .await;
    let err = result.unwrap_err();
    let code = err.as_database_error().and_then(|e| e.code());
    assert_eq!(code.as_deref(), Some("23505"));
}
