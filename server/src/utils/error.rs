use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::coupon::CouponState;
use crate::models::reservation::ReservationState;
use crate::services::access::AccessDenial;
use crate::services::pricing::CouponError;
use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponError),

    #[error("Cannot {action} a reservation that is {current}")]
    InvalidState {
        current: ReservationState,
        action: &'static str,
    },

    #[error("Cannot {action} a coupon that is {}", .current.as_str())]
    InvalidCouponState {
        current: CouponState,
        action: &'static str,
    },

    #[error("Access denied: {0}")]
    AccessDenied(#[from] AccessDenial),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Coupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidState { .. } | AppError::InvalidCouponState { .. } => {
                StatusCode::CONFLICT
            }
            AppError::AccessDenied(denial) => match denial {
                AccessDenial::NotFound => StatusCode::NOT_FOUND,
                AccessDenial::AlreadyUsed | AccessDenial::InvalidState(_) => StatusCode::CONFLICT,
                AccessDenial::WrongDate { .. } | AccessDenial::OutsideWindow { .. } => {
                    StatusCode::FORBIDDEN
                }
            },
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unavailable(_) => "UNAVAILABLE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Coupon(e) => e.code(),
            AppError::InvalidState { .. } | AppError::InvalidCouponState { .. } => {
                "INVALID_STATE"
            }
            AppError::AccessDenied(denial) => denial.code(),
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Machine-readable context a client can act on, e.g. the current
    /// reservation state when a transition or an admission was refused.
    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidState { current, action } => Some(json!({
                "current_state": current,
                "action": action,
            })),
            AppError::InvalidCouponState { current, action } => Some(json!({
                "current_state": current,
                "action": action,
            })),
            AppError::AccessDenied(denial) => denial.details(),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            _ => {
                warn!(code = self.code(), message = %self, "Request rejected");
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::Unavailable(msg)
            | AppError::Conflict(msg)
            | AppError::ExternalServiceError(msg) => msg.clone(),
            AppError::Coupon(e) => e.to_string(),
            AppError::AccessDenied(denial) => denial.to_string(),
            AppError::InvalidState { .. } | AppError::InvalidCouponState { .. } => {
                self.to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        error_response(code, public_message, self.details(), status)
    }
}
