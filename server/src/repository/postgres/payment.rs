use async_trait::async_trait;
use uuid::Uuid;

use super::reservation::{lock_reservation, record_cancellation, update_state};
use super::rows::{PaymentRow, PAYMENT_COLUMNS};
use super::{map_db_error, ConnectionPool};
use crate::models::payment::{Payment, PaymentCallback};
use crate::models::reservation::Transition;
use crate::repository::{PaymentRepository, Settlement};
use crate::services::lifecycle::{plan_settlement, PAYMENT_FAILED_REASON};
use crate::utils::error::{AppError, AppResult};

pub struct PaymentRepositoryImpl {
    db: ConnectionPool,
}

impl PaymentRepositoryImpl {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentRepository for PaymentRepositoryImpl {
    async fn attach_transaction(
        &self,
        payment_id: Uuid,
        transaction_id: &str,
    ) -> AppResult<Payment> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET transaction_id = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(transaction_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(map_db_error)?;

        row.map(Payment::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Payment '{payment_id}' was not found")))
    }

    async fn settle(&self, callback: &PaymentCallback) -> AppResult<Settlement> {
        let mut tx = self.db.begin().await?;

        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(&callback.transaction_id)
        .fetch_optional(&mut *tx)
        .await?;
        let payment = row.map(Payment::try_from).transpose()?.ok_or_else(|| {
            AppError::NotFound(format!(
                "No payment for transaction '{}'",
                callback.transaction_id
            ))
        })?;
        let reservation = lock_reservation(&mut tx, payment.reservation_id).await?;

        let plan = plan_settlement(&payment, reservation.state, callback)?;
        if plan.replayed {
            tx.commit().await?;
            return Ok(Settlement {
                payment,
                reservation,
                replayed: true,
            });
        }

        let row: PaymentRow = sqlx::query_as(&format!(
            "UPDATE payments SET state = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.id)
        .bind(plan.payment_state.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let payment = Payment::try_from(row)?;

        let reservation = match plan.transition {
            Some(transition) => {
                let next = reservation.state.apply(transition)?;
                let updated = update_state(&mut tx, reservation.id, next).await?;
                if transition == Transition::Cancel {
                    record_cancellation(&mut tx, reservation.id, PAYMENT_FAILED_REASON, None)
                        .await?;
                }
                updated
            }
            None => reservation,
        };

        tx.commit().await.map_err(map_db_error)?;
        Ok(Settlement {
            payment,
            reservation,
            replayed: false,
        })
    }
}
