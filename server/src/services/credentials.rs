//! Per-attendee admission credentials.
//!
//! A credential is two independent values: an opaque QR code, which is what
//! ends up printed or rendered on a phone, and a verification token. Only the
//! SHA-256 digest of the token is persisted.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::attendee::{Attendee, AttendeeCredential, MintedCredential};
use crate::models::reservation::Reservation;
use crate::repository::AttendeeRepository;
use crate::services::notifier::{CredentialDelivery, CredentialNotifier};
use crate::utils::error::{AppError, AppResult};

const TOKEN_BYTES: usize = 32;

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn new_qr_code() -> String {
    format!("QR-{}", Uuid::new_v4().simple())
}

pub fn mint(attendee_id: Uuid) -> MintedCredential {
    let token = new_token();
    MintedCredential {
        attendee_id,
        qr_code: new_qr_code(),
        token_hash: hash_token(&token),
        token,
    }
}

/// Checks the attendee list of a booking request against its declared count.
pub fn validate_attendees(attendees: &[Attendee], declared: Option<i32>) -> AppResult<()> {
    if attendees.is_empty() {
        return Err(AppError::ValidationError(
            "at least one attendee is required".into(),
        ));
    }
    if let Some(count) = declared {
        if usize::try_from(count).ok() != Some(attendees.len()) {
            return Err(AppError::ValidationError(format!(
                "attendee_count is {count} but {} attendees were listed",
                attendees.len()
            )));
        }
    }
    for attendee in attendees {
        if attendee.name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "attendee name must not be empty".into(),
            ));
        }
        let email = attendee.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => {
                return Err(AppError::ValidationError(format!(
                    "'{email}' is not a valid email address"
                )))
            }
        }
    }
    Ok(())
}

pub struct CredentialIssuer {
    attendees: Arc<dyn AttendeeRepository>,
    notifier: Arc<dyn CredentialNotifier>,
}

impl CredentialIssuer {
    pub fn new(
        attendees: Arc<dyn AttendeeRepository>,
        notifier: Arc<dyn CredentialNotifier>,
    ) -> Self {
        Self {
            attendees,
            notifier,
        }
    }

    /// Mints credentials for every attendee of `reservation` that has none
    /// yet, stores them and hands each one to the notifier. Returns the
    /// number of credentials delivered by this call.
    ///
    /// Only the token hash is kept, so a credential whose delivery fails is
    /// revoked again and the call fails with `ExternalServiceError`; the next
    /// issuance for the reservation mints a fresh one for that attendee.
    pub async fn issue(&self, reservation: &Reservation) -> AppResult<usize> {
        let attendees = self.attendees.list_for_reservation(reservation.id).await?;
        let pending: Vec<&AttendeeCredential> =
            attendees.iter().filter(|a| !a.is_issued()).collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let minted: Vec<MintedCredential> = pending.iter().map(|a| mint(a.id)).collect();
        let stored = self.attendees.store_credentials(&minted).await?;
        if stored == 0 {
            // Lost to a concurrent issuance, which delivers its own tokens.
            warn!(
                reservation = %reservation.code,
                minted = minted.len(),
                "Credential issuance raced with another request"
            );
            return Ok(0);
        }

        let mut undelivered = Vec::new();
        for (attendee, credential) in pending.iter().zip(&minted) {
            let delivery = CredentialDelivery {
                attendee_name: attendee.name.clone(),
                attendee_email: attendee.email.clone(),
                reservation_code: reservation.code.clone(),
                qr_code: credential.qr_code.clone(),
                token: credential.token.clone(),
                date: reservation.date,
                start_time: reservation.start_time,
                end_time: reservation.end_time,
            };
            if let Err(e) = self.notifier.deliver(&delivery).await {
                warn!(
                    reservation = %reservation.code,
                    attendee = %attendee.id,
                    error = %e,
                    "Credential delivery failed"
                );
                undelivered.push(credential.clone());
            }
        }

        let delivered = stored - undelivered.len();
        if !undelivered.is_empty() {
            let revoked = self.attendees.revoke_credentials(&undelivered).await?;
            error!(
                reservation = %reservation.code,
                delivered,
                revoked,
                "Revoked undelivered credentials"
            );
            return Err(AppError::ExternalServiceError(format!(
                "credentials for {} attendee(s) of reservation '{}' could not be delivered",
                undelivered.len(),
                reservation.code
            )));
        }

        info!(reservation = %reservation.code, issued = delivered, "Credentials issued");
        Ok(delivered)
    }
}
