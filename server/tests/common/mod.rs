#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use court_booking_server::models::attendee::Attendee;
use court_booking_server::models::coupon::{DiscountKind, NewCoupon};
use court_booking_server::models::resource::{Resource, ResourceState};
use court_booking_server::repository::memory::MemoryStore;
use court_booking_server::repository::{CouponRepository, Repositories};
use court_booking_server::services::access::DEFAULT_GRACE_MINUTES;
use court_booking_server::services::clock::FixedClock;
use court_booking_server::services::lifecycle::BookingRequest;
use court_booking_server::services::notifier::{
    CredentialDelivery, CredentialNotifier, NotifyError,
};
use court_booking_server::services::payment_gateway::{
    GatewayError, PaymentGateway, PaymentRequest, PaymentSession,
};
use court_booking_server::state::AppState;

/// Gateway double that hands out sequential transaction ids.
#[derive(Default)]
pub struct StubGateway {
    pub fail: AtomicBool,
    issued: AtomicUsize,
    pub requests: Mutex<Vec<PaymentRequest>>,
}

impl StubGateway {
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_transaction(&self) -> String {
        format!("txn-{}", self.issued.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentSession, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 503,
                body: "maintenance".into(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentSession {
            transaction_id: format!("txn-{n}"),
            payment_url: format!("https://pay.example.com/checkout/{n}"),
        })
    }
}

/// Notifier double that records deliveries, or refuses them while `fail`
/// is set.
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: AtomicBool,
    pub deliveries: Mutex<Vec<CredentialDelivery>>,
}

impl RecordingNotifier {
    pub fn for_reservation(&self, code: &str) -> Vec<CredentialDelivery> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.reservation_code == code)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl CredentialNotifier for RecordingNotifier {
    async fn deliver(&self, delivery: &CredentialDelivery) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("mail server unreachable".into()));
        }
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveDateTime {
    today().and_time(t(h, m))
}

pub fn booking_request(
    resource_id: Uuid,
    start: NaiveTime,
    end: NaiveTime,
    attendees: usize,
) -> BookingRequest {
    BookingRequest {
        resource_id,
        owner_id: Uuid::new_v4(),
        discipline_id: Uuid::new_v4(),
        date: today(),
        start_time: start,
        end_time: end,
        attendees: (0..attendees)
            .map(|i| Attendee {
                name: format!("Player {i}"),
                email: format!("player{i}@example.com"),
            })
            .collect(),
        attendee_count: Some(attendees as i32),
        coupon_code: None,
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    pub court: Resource,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let court = Resource {
            id: Uuid::new_v4(),
            name: "Cancha Central".into(),
            opening_time: t(6, 0),
            closing_time: t(23, 0),
            hourly_rate: dec!(100.00),
            state: ResourceState::Available,
        };
        store.insert_resource(court.clone()).unwrap();

        let gateway = Arc::new(StubGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(FixedClock::new(at(8, 0)));
        let state = AppState::new(
            Repositories::in_memory(store.clone()),
            gateway.clone(),
            notifier.clone(),
            clock.clone(),
            DEFAULT_GRACE_MINUTES,
        );

        Self {
            store,
            state,
            gateway,
            notifier,
            clock,
            court,
        }
    }

    pub fn add_court(&self, state: ResourceState) -> Resource {
        let court = Resource {
            id: Uuid::new_v4(),
            name: "Cancha Norte".into(),
            state,
            ..self.court.clone()
        };
        self.store.insert_resource(court.clone()).unwrap();
        court
    }

    pub fn request(&self, start: NaiveTime, end: NaiveTime, attendees: usize) -> BookingRequest {
        booking_request(self.court.id, start, end, attendees)
    }

    pub async fn coupon(&self, code: &str, kind: DiscountKind, magnitude: Decimal) {
        self.store
            .insert_many(vec![NewCoupon {
                code: code.into(),
                kind,
                magnitude,
                expires_on: None,
                owner_id: None,
            }])
            .await
            .unwrap();
    }
}
