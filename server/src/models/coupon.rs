use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountKind::Percentage),
            "fixed" => Ok(DiscountKind::Fixed),
            other => Err(AppError::InternalServerError(format!(
                "unknown discount kind '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponState {
    Active,
    Utilized,
    Inactive,
}

impl CouponState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponState::Active => "active",
            CouponState::Utilized => "utilized",
            CouponState::Inactive => "inactive",
        }
    }

    /// Moves an unredeemed coupon between `active` and `inactive`. A
    /// utilized coupon stays utilized.
    pub fn switch_to(self, target: CouponState) -> Result<CouponState, AppError> {
        let action = match target {
            CouponState::Active => "activate",
            CouponState::Inactive => "deactivate",
            CouponState::Utilized => "redeem",
        };
        match (self, target) {
            (CouponState::Active, CouponState::Inactive)
            | (CouponState::Inactive, CouponState::Active) => Ok(target),
            (current, _) => Err(AppError::InvalidCouponState { current, action }),
        }
    }
}

impl FromStr for CouponState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CouponState::Active),
            "utilized" => Ok(CouponState::Utilized),
            "inactive" => Ok(CouponState::Inactive),
            other => Err(AppError::InternalServerError(format!(
                "unknown coupon state '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub magnitude: Decimal,
    pub expires_on: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
    pub state: CouponState,
    pub reservation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub kind: DiscountKind,
    pub magnitude: Decimal,
    pub expires_on: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
}

/// The effect of a coupon on a reservation's cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Discount {
    pub new_cost: Decimal,
    pub discount: Decimal,
}
