use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers};
use crate::handlers::{access, coupons, health_check, payments, reservations, resources};
use crate::state::AppState;

/// Layer settings that vary between deployments.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub allowed_origins: String,
    pub include_hsts: bool,
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/reservations", post(reservations::create_reservation))
        .route(
            "/reservations/complete-elapsed",
            post(reservations::complete_elapsed),
        )
        .route("/reservations/:code", get(reservations::get_reservation))
        .route(
            "/reservations/:code/cancel",
            post(reservations::cancel_reservation),
        )
        .route(
            "/reservations/:code/checkout",
            post(reservations::checkout_reservation),
        )
        .route(
            "/reservations/:code/credentials",
            post(reservations::resend_credentials),
        )
        .route("/resources/:id/availability", get(resources::availability))
        .route("/resources/:id/reservations", get(resources::day_sheet))
        .route("/payments/callback", post(payments::payment_callback))
        .route("/access/verify", post(access::verify_access))
        .route("/coupons", post(coupons::create_coupon))
        .route("/coupons/batch", post(coupons::generate_batch))
        .route("/coupons/:code/validate", get(coupons::validate_coupon))
        .route("/coupons/:code/activate", post(coupons::activate_coupon))
        .route("/coupons/:code/deactivate", post(coupons::deactivate_coupon))
}

pub fn create_routes(state: AppState, options: &RouterOptions) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes());

    with_security_headers(router, options.include_hsts)
        .layer(create_cors_layer(&options.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
