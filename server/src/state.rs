use std::sync::Arc;

use crate::repository::Repositories;
use crate::services::access::AccessVerifier;
use crate::services::availability::AvailabilityChecker;
use crate::services::clock::Clock;
use crate::services::coupons::CouponService;
use crate::services::credentials::CredentialIssuer;
use crate::services::lifecycle::ReservationService;
use crate::services::notifier::CredentialNotifier;
use crate::services::payment_gateway::PaymentGateway;

/// Services shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub availability: Arc<AvailabilityChecker>,
    pub access: Arc<AccessVerifier>,
    pub coupons: Arc<CouponService>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn CredentialNotifier>,
        clock: Arc<dyn Clock>,
        access_grace_minutes: i64,
    ) -> Self {
        let availability = Arc::new(AvailabilityChecker::new(
            repos.resources.clone(),
            repos.reservations.clone(),
        ));
        let issuer = Arc::new(CredentialIssuer::new(repos.attendees.clone(), notifier));
        let reservations = Arc::new(ReservationService::new(
            repos.resources.clone(),
            repos.reservations.clone(),
            repos.payments.clone(),
            repos.attendees.clone(),
            availability.clone(),
            issuer,
            gateway,
            clock.clone(),
        ));
        let access = Arc::new(AccessVerifier::new(
            repos.attendees,
            clock.clone(),
            access_grace_minutes,
        ));
        let coupons = Arc::new(CouponService::new(repos.coupons, clock));

        Self {
            reservations,
            availability,
            access,
            coupons,
        }
    }
}
