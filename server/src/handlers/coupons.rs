use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::coupon::NewCoupon;
use crate::services::coupons::BatchRequest;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub user_id: Option<Uuid>,
}

pub async fn create_coupon(
    State(state): State<AppState>,
    payload: Result<Json<NewCoupon>, JsonRejection>,
) -> AppResult<Response> {
    let Json(coupon) = payload?;
    let coupon = state.coupons.create(coupon).await?;
    Ok(created(coupon, "Coupon created", Vec::new()))
}

pub async fn generate_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload?;
    let coupons = state.coupons.generate_batch(request).await?;
    let message = format!("{} coupons generated", coupons.len());
    Ok(created(coupons, message, Vec::new()))
}

pub async fn activate_coupon(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let coupon = state.coupons.activate(&code).await?;
    Ok(success(coupon, "Coupon activated"))
}

pub async fn deactivate_coupon(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let coupon = state.coupons.deactivate(&code).await?;
    Ok(success(coupon, "Coupon deactivated"))
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    code: Result<Path<String>, PathRejection>,
    query: Result<Query<ValidateQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Path(code) = code?;
    let Query(ValidateQuery { user_id }) = query?;
    let check = state.coupons.validate(&code, user_id).await?;
    let message = if check.valid {
        "Coupon is valid"
    } else {
        "Coupon cannot be redeemed"
    };
    Ok(success(check, message))
}
