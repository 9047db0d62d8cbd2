use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;

use crate::models::payment::PaymentCallback;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::success;

pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<PaymentCallback>, JsonRejection>,
) -> AppResult<Response> {
    let Json(callback) = payload?;
    let settlement = state.reservations.handle_payment_callback(callback).await?;

    let message = if settlement.replayed {
        "Callback already processed"
    } else {
        "Callback processed"
    };
    Ok(success(settlement, message))
}
