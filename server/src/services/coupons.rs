use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::coupon::{Coupon, CouponState, DiscountKind, NewCoupon};
use crate::repository::CouponRepository;
use crate::services::clock::Clock;
use crate::services::pricing::{self, CouponError};
use crate::utils::error::{AppError, AppResult};

pub const MAX_BATCH: u32 = 500;
const SUFFIX_LEN: usize = 6;
const BATCH_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub prefix: String,
    pub count: u32,
    pub kind: DiscountKind,
    pub magnitude: Decimal,
    pub expires_on: Option<NaiveDate>,
}

/// Outcome of a dry-run coupon check.
#[derive(Debug, Clone, Serialize)]
pub struct CouponCheck {
    pub valid: bool,
    pub reason: Option<CouponError>,
    pub coupon: Option<Coupon>,
}

fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn batch_code(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| char::from(b).to_ascii_uppercase())
        .take(SUFFIX_LEN)
        .collect();
    format!("{prefix}_{suffix}")
}

fn batch_codes(prefix: &str, count: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);
    while codes.len() < count {
        let code = batch_code(prefix);
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }
    codes
}

pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
    clock: Arc<dyn Clock>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { coupons, clock }
    }

    #[instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create(&self, mut coupon: NewCoupon) -> AppResult<Coupon> {
        coupon.code = normalize_code(&coupon.code);
        pricing::validate_new_coupon(&coupon)?;

        let mut created = self.coupons.insert_many(vec![coupon]).await?;
        let coupon = created
            .pop()
            .ok_or_else(|| AppError::InternalServerError("coupon insert returned nothing".into()))?;
        info!(coupon = %coupon.code, kind = coupon.kind.as_str(), "Coupon created");
        Ok(coupon)
    }

    /// Creates `count` coupons named `PREFIX_XXXXXX`. A collision with an
    /// existing code regenerates the whole batch.
    #[instrument(skip(self, request), fields(prefix = %request.prefix, count = request.count))]
    pub async fn generate_batch(&self, request: BatchRequest) -> AppResult<Vec<Coupon>> {
        let prefix = normalize_code(&request.prefix);
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::ValidationError(
                "prefix must be non-empty and alphanumeric".into(),
            ));
        }
        if request.count == 0 || request.count > MAX_BATCH {
            return Err(AppError::ValidationError(format!(
                "count must be between 1 and {MAX_BATCH}"
            )));
        }
        let template = NewCoupon {
            code: prefix.clone(),
            kind: request.kind,
            magnitude: request.magnitude,
            expires_on: request.expires_on,
            owner_id: None,
        };
        pricing::validate_new_coupon(&template)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let batch = batch_codes(&prefix, request.count as usize)
                .into_iter()
                .map(|code| NewCoupon {
                    code,
                    ..template.clone()
                })
                .collect();
            match self.coupons.insert_many(batch).await {
                Err(AppError::Conflict(msg)) if attempt < BATCH_ATTEMPTS => {
                    warn!(attempt, %msg, "Coupon batch collided with an existing code");
                }
                Ok(created) => {
                    info!(%prefix, count = created.len(), "Coupon batch generated");
                    return Ok(created);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn activate(&self, code: &str) -> AppResult<Coupon> {
        self.switch(code, CouponState::Active).await
    }

    pub async fn deactivate(&self, code: &str) -> AppResult<Coupon> {
        self.switch(code, CouponState::Inactive).await
    }

    #[instrument(skip(self))]
    async fn switch(&self, code: &str, target: CouponState) -> AppResult<Coupon> {
        let coupon = self
            .coupons
            .set_state(&normalize_code(code), target)
            .await?;
        info!(coupon = %coupon.code, state = coupon.state.as_str(), "Coupon state changed");
        Ok(coupon)
    }

    /// Runs the redemption checks without redeeming anything.
    pub async fn validate(&self, code: &str, owner_id: Option<Uuid>) -> AppResult<CouponCheck> {
        let Some(coupon) = self.coupons.find_by_code(&normalize_code(code)).await? else {
            return Ok(CouponCheck {
                valid: false,
                reason: Some(CouponError::NotFound),
                coupon: None,
            });
        };
        let reason = pricing::check_redeemable(&coupon, owner_id, self.clock.today()).err();
        Ok(CouponCheck {
            valid: reason.is_none(),
            reason,
            coupon: Some(coupon),
        })
    }
}
