use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An attendee as named in a booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
}

/// One attendee's admission right. `qr_code` and `token_hash` stay empty
/// until the reservation is confirmed and credentials are issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeCredential {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub name: String,
    pub email: String,
    pub qr_code: Option<String>,
    #[serde(skip_serializing)]
    pub token_hash: Option<String>,
    pub attended: bool,
    pub validated_at: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
}

impl AttendeeCredential {
    pub fn is_issued(&self) -> bool {
        self.qr_code.is_some()
    }
}

/// A freshly minted credential for one attendee, holding the hash that is
/// persisted alongside the plaintext token that is delivered.
#[derive(Debug, Clone)]
pub struct MintedCredential {
    pub attendee_id: Uuid,
    pub qr_code: String,
    pub token: String,
    pub token_hash: String,
}
