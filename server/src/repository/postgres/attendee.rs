use async_trait::async_trait;
use uuid::Uuid;

use super::reservation::{lock_reservation, update_state};
use super::rows::{AttendeeRow, ATTENDEE_COLUMNS};
use super::{map_db_error, ConnectionPool};
use crate::models::attendee::{AttendeeCredential, MintedCredential};
use crate::models::reservation::{ReservationState, Transition};
use crate::repository::AttendeeRepository;
use crate::services::access::{AccessDenial, Admission, AdmissionGate};
use crate::utils::error::AppResult;

pub struct AttendeeRepositoryImpl {
    db: ConnectionPool,
}

impl AttendeeRepositoryImpl {
    pub fn new(db: ConnectionPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AttendeeRepository for AttendeeRepositoryImpl {
    async fn list_for_reservation(
        &self,
        reservation_id: Uuid,
    ) -> AppResult<Vec<AttendeeCredential>> {
        let rows: Vec<AttendeeRow> = sqlx::query_as(&format!(
            "SELECT {ATTENDEE_COLUMNS} FROM attendees WHERE reservation_id = $1 \
             ORDER BY created_at, id"
        ))
        .bind(reservation_id)
        .fetch_all(self.db.inner_ref())
        .await?;

        Ok(rows.into_iter().map(AttendeeCredential::from).collect())
    }

    async fn store_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize> {
        let mut tx = self.db.begin().await?;
        for credential in minted {
            let updated = sqlx::query(
                "UPDATE attendees SET qr_code = $2, token_hash = $3 \
                 WHERE id = $1 AND qr_code IS NULL",
            )
            .bind(credential.attendee_id)
            .bind(&credential.qr_code)
            .bind(&credential.token_hash)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(0);
            }
        }
        tx.commit().await.map_err(map_db_error)?;
        Ok(minted.len())
    }

    async fn revoke_credentials(&self, minted: &[MintedCredential]) -> AppResult<usize> {
        let mut tx = self.db.begin().await?;
        let mut revoked = 0;
        for credential in minted {
            let updated = sqlx::query(
                "UPDATE attendees SET qr_code = NULL, token_hash = NULL \
                 WHERE id = $1 AND qr_code = $2 AND NOT attended",
            )
            .bind(credential.attendee_id)
            .bind(&credential.qr_code)
            .execute(&mut *tx)
            .await?;
            revoked += updated.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(revoked)
    }

    async fn admit(
        &self,
        qr_code: &str,
        token_hash: &str,
        gate: &AdmissionGate,
    ) -> AppResult<Admission> {
        let mut tx = self.db.begin().await?;

        let row: Option<AttendeeRow> = sqlx::query_as(&format!(
            "SELECT {ATTENDEE_COLUMNS} FROM attendees \
             WHERE qr_code = $1 AND token_hash = $2 FOR UPDATE"
        ))
        .bind(qr_code)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;
        let credential = row
            .map(AttendeeCredential::from)
            .ok_or(AccessDenial::NotFound)?;
        let reservation = lock_reservation(&mut tx, credential.reservation_id).await?;

        gate.check(&credential, &reservation)?;

        let row: AttendeeRow = sqlx::query_as(&format!(
            "UPDATE attendees SET attended = TRUE, validated_at = $2 WHERE id = $1 \
             RETURNING {ATTENDEE_COLUMNS}"
        ))
        .bind(credential.id)
        .bind(gate.now)
        .fetch_one(&mut *tx)
        .await?;
        let credential = AttendeeCredential::from(row);

        let began = reservation.state == ReservationState::Confirmed;
        let reservation = if began {
            let next = reservation.state.apply(Transition::Begin)?;
            update_state(&mut tx, reservation.id, next).await?
        } else {
            reservation
        };

        tx.commit().await.map_err(map_db_error)?;
        Ok(Admission {
            credential,
            reservation,
            began,
        })
    }
}
