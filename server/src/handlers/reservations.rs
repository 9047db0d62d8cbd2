use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::lifecycle::BookingRequest;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
}

pub async fn create_reservation(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload?;
    let outcome = state.reservations.book(request).await?;

    let message = if outcome.payment_url.is_some() {
        "Reservation created, awaiting payment"
    } else {
        "Reservation confirmed"
    };
    let warnings = outcome.warnings.clone();
    Ok(created(outcome, message, warnings))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let details = state.reservations.details(&code).await?;
    Ok(success(details, "Reservation retrieved"))
}

/// The body is optional; an empty one cancels with the default reason, a
/// malformed one is rejected.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> AppResult<Response> {
    let Path(code) = code?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CancelRequest::default()
    } else {
        let Json(request) = Json::<CancelRequest>::from_bytes(&body)?;
        request
    };
    let reservation = state
        .reservations
        .cancel(&code, request.reason, request.cancelled_by)
        .await?;
    Ok(success(reservation, "Reservation cancelled"))
}

pub async fn checkout_reservation(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let reservation = state.reservations.checkout(&code).await?;
    Ok(success(reservation, "Reservation completed"))
}

pub async fn resend_credentials(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let details = state.reservations.resend_credentials(&code).await?;
    Ok(success(details, "Credentials sent"))
}

pub async fn complete_elapsed(State(state): State<AppState>) -> AppResult<Response> {
    let completed = state.reservations.complete_elapsed().await?;
    let message = format!("{} reservation(s) completed", completed.len());
    Ok(success(completed, message))
}
