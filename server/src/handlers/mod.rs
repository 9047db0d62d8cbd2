use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod access;
pub mod coupons;
pub mod payments;
pub mod reservations;
pub mod resources;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "court-booking-api",
    };

    success(payload, "Health check successful")
}
