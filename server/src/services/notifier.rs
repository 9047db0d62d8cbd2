use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// What one attendee needs to get through the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialDelivery {
    pub attendee_name: String,
    pub attendee_email: String,
    pub reservation_code: String,
    pub qr_code: String,
    pub token: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Error)]
#[error("credential delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound channel for credentials. Implementations render and send; they
/// never decide who gets admitted.
#[async_trait]
pub trait CredentialNotifier: Send + Sync {
    async fn deliver(&self, delivery: &CredentialDelivery) -> Result<(), NotifyError>;
}

/// Writes deliveries to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl CredentialNotifier for LogNotifier {
    async fn deliver(&self, delivery: &CredentialDelivery) -> Result<(), NotifyError> {
        info!(
            reservation = %delivery.reservation_code,
            attendee = %delivery.attendee_email,
            qr_code = %delivery.qr_code,
            date = %delivery.date,
            start = %delivery.start_time,
            end = %delivery.end_time,
            "Credential ready for delivery"
        );
        Ok(())
    }
}
