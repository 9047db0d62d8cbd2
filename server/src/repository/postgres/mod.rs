//! PostgreSQL implementations of the repository traits. Queries are bound at
//! runtime so the crate builds without a live database.

use sqlx::PgPool;

use crate::utils::error::{AppError, AppResult};

pub mod attendee;
pub mod coupon;
pub mod payment;
pub mod reservation;
pub mod resource;
mod rows;

const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct ConnectionPool(PgPool);

impl ConnectionPool {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }

    pub fn inner_ref(&self) -> &PgPool {
        &self.0
    }

    pub async fn begin(&self) -> AppResult<sqlx::Transaction<'_, sqlx::Postgres>> {
        self.0.begin().await.map_err(AppError::DatabaseError)
    }
}

/// Translates constraint outcomes into domain errors. A lost race on the
/// no-overlap constraint surfaces as an exclusion violation, which means the
/// window is taken.
pub(crate) fn map_db_error(err: sqlx::Error) -> AppError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    match code.as_deref() {
        Some(EXCLUSION_VIOLATION) => {
            AppError::Unavailable("the requested window was booked concurrently".into())
        }
        Some(UNIQUE_VIOLATION) => AppError::Conflict(
            err.as_database_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| "duplicate key".into()),
        ),
        _ => AppError::DatabaseError(err),
    }
}
