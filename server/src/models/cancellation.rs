use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub reason: String,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
