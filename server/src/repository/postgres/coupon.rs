use async_trait::async_trait;
use uuid::Uuid;

use super::rows::{CouponRow, COUPON_COLUMNS};
use super::{map_db_error, ConnectionPool};
use crate::models::coupon::{Coupon, CouponState, NewCoupon};
use crate::repository::CouponRepository;
use crate::utils::error::{AppError, AppResult};

pub struct CouponRepositoryImpl {
    db: ConnectionPool,
}

impl CouponRepositoryImpl {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CouponRepository for CouponRepositoryImpl {
    async fn insert_many(&self, coupons: Vec<NewCoupon>) -> AppResult<Vec<Coupon>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(coupons.len());
        for coupon in coupons {
            let row: CouponRow = sqlx::query_as(&format!(
                "INSERT INTO coupons (id, code, kind, magnitude, expires_on, owner_id, state) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COUPON_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&coupon.code)
            .bind(coupon.kind.as_str())
            .bind(coupon.magnitude)
            .bind(coupon.expires_on)
            .bind(coupon.owner_id)
            .bind(CouponState::Active.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;
            created.push(Coupon::try_from(row)?);
        }
        tx.commit().await.map_err(map_db_error)?;
        Ok(created)
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(self.db.inner_ref())
        .await?;

        row.map(Coupon::try_from).transpose()
    }

    async fn set_state(&self, code: &str, target: CouponState) -> AppResult<Coupon> {
        let mut tx = self.db.begin().await?;
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;
        let coupon = row
            .map(Coupon::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Coupon '{code}' was not found")))?;
        let next = coupon.state.switch_to(target)?;

        let row: CouponRow = sqlx::query_as(&format!(
            "UPDATE coupons SET state = $2 WHERE id = $1 RETURNING {COUPON_COLUMNS}"
        ))
        .bind(coupon.id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;
        tx.commit().await.map_err(map_db_error)?;
        Coupon::try_from(row)
    }
}
