//! Reservation pricing and coupon rules.
//!
//! Everything here is pure decimal arithmetic; persistence of a coupon's
//! `utilized` flag happens in the repositories, inside the same transaction
//! that updates the reservation's cost.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::coupon::{Coupon, CouponState, Discount, DiscountKind, NewCoupon};
use crate::models::reservation::TimeWindow;
use crate::models::resource::Resource;
use crate::utils::error::{AppError, AppResult};

const CURRENCY_DP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponError {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon has already been used")]
    AlreadyUsed,
    #[error("Coupon is not valid for this user")]
    WrongOwner,
}

impl CouponError {
    pub fn code(&self) -> &'static str {
        match self {
            CouponError::NotFound => "COUPON_NOT_FOUND",
            CouponError::Inactive => "COUPON_INACTIVE",
            CouponError::Expired => "COUPON_EXPIRED",
            CouponError::AlreadyUsed => "COUPON_ALREADY_USED",
            CouponError::WrongOwner => "COUPON_WRONG_OWNER",
        }
    }
}

/// Rounds to cents and pins the scale, so amounts always render as `0.00`.
fn to_currency(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_DP);
    rounded
}

/// `minutes × hourly_rate / 60`, rounded to cents.
pub fn price(resource: &Resource, window: &TimeWindow) -> Decimal {
    let minutes = Decimal::from(window.minutes());
    to_currency(minutes * resource.hourly_rate / Decimal::from(60))
}

/// Discount produced by a coupon of `kind` and `magnitude` on `cost`,
/// never larger than the cost itself.
pub fn discount(kind: DiscountKind, magnitude: Decimal, cost: Decimal) -> Discount {
    let raw = match kind {
        DiscountKind::Percentage => to_currency(cost * magnitude / Decimal::ONE_HUNDRED),
        DiscountKind::Fixed => to_currency(magnitude),
    };
    let discount = raw.min(cost).max(Decimal::ZERO);
    Discount {
        new_cost: to_currency(cost - discount),
        discount: to_currency(discount),
    }
}

/// Checks that `coupon` may be redeemed by `owner_id` on `today`.
pub fn check_redeemable(
    coupon: &Coupon,
    owner_id: Option<Uuid>,
    today: NaiveDate,
) -> Result<(), CouponError> {
    match coupon.state {
        CouponState::Active => {}
        CouponState::Utilized => return Err(CouponError::AlreadyUsed),
        CouponState::Inactive => return Err(CouponError::Inactive),
    }
    if coupon.expires_on.is_some_and(|expiry| expiry < today) {
        return Err(CouponError::Expired);
    }
    if coupon.reservation_id.is_some() {
        return Err(CouponError::AlreadyUsed);
    }
    match (coupon.owner_id, owner_id) {
        (Some(scoped), Some(owner)) if scoped != owner => Err(CouponError::WrongOwner),
        _ => Ok(()),
    }
}

/// Full coupon evaluation against a reservation owned by `owner_id` costing `cost`.
pub fn apply_coupon(
    coupon: &Coupon,
    owner_id: Uuid,
    cost: Decimal,
    today: NaiveDate,
) -> Result<Discount, CouponError> {
    check_redeemable(coupon, Some(owner_id), today)?;
    Ok(discount(coupon.kind, coupon.magnitude, cost))
}

pub fn validate_new_coupon(coupon: &NewCoupon) -> AppResult<()> {
    if coupon.code.trim().is_empty() {
        return Err(AppError::ValidationError("coupon code must not be empty".into()));
    }
    if coupon.magnitude <= Decimal::ZERO {
        return Err(AppError::ValidationError(
            "discount magnitude must be greater than zero".into(),
        ));
    }
    if coupon.kind == DiscountKind::Percentage && coupon.magnitude > Decimal::ONE_HUNDRED {
        return Err(AppError::ValidationError(
            "percentage discount cannot exceed 100%".into(),
        ));
    }
    Ok(())
}
