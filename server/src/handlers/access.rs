use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub qr_code: String,
    pub token: String,
}

pub async fn verify_access(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload?;
    let admission = state.access.verify(&request.qr_code, &request.token).await?;
    Ok(success(admission, "Access granted"))
}
