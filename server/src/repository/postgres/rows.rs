use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::attendee::AttendeeCredential;
use crate::models::coupon::Coupon;
use crate::models::payment::Payment;
use crate::models::reservation::Reservation;
use crate::models::resource::Resource;
use crate::utils::error::AppError;

pub const RESOURCE_COLUMNS: &str =
    "id, name, opening_time, closing_time, hourly_rate, state";

pub const RESERVATION_COLUMNS: &str = "id, code, resource_id, owner_id, discipline_id, \
     reservation_date, start_time, end_time, attendee_count, cost, state, created_at, updated_at";

pub const ATTENDEE_COLUMNS: &str =
    "id, reservation_id, name, email, qr_code, token_hash, attended, validated_at, created_at";

pub const PAYMENT_COLUMNS: &str =
    "id, reservation_id, amount, method, transaction_id, state, created_at, updated_at";

pub const COUPON_COLUMNS: &str =
    "id, code, kind, magnitude, expires_on, owner_id, state, reservation_id, created_at";

#[derive(FromRow)]
pub struct ResourceRow {
    pub id: Uuid,
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub hourly_rate: Decimal,
    pub state: String,
}

impl TryFrom<ResourceRow> for Resource {
    type Error = AppError;

    fn try_from(row: ResourceRow) -> Result<Self, Self::Error> {
        Ok(Resource {
            id: row.id,
            name: row.name,
            opening_time: row.opening_time,
            closing_time: row.closing_time,
            hourly_rate: row.hourly_rate,
            state: row.state.parse()?,
        })
    }
}

#[derive(FromRow)]
pub struct ReservationRow {
    pub id: Uuid,
    pub code: String,
    pub resource_id: Uuid,
    pub owner_id: Uuid,
    pub discipline_id: Uuid,
    pub reservation_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attendee_count: i32,
    pub cost: Decimal,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            code: row.code,
            resource_id: row.resource_id,
            owner_id: row.owner_id,
            discipline_id: row.discipline_id,
            date: row.reservation_date,
            start_time: row.start_time,
            end_time: row.end_time,
            attendee_count: row.attendee_count,
            cost: row.cost,
            state: row.state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct AttendeeRow {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub name: String,
    pub email: String,
    pub qr_code: Option<String>,
    pub token_hash: Option<String>,
    pub attended: bool,
    pub validated_at: Option<NaiveDateTime>,
    pub created_at: DateTime<Utc>,
}

impl From<AttendeeRow> for AttendeeCredential {
    fn from(row: AttendeeRow) -> Self {
        AttendeeCredential {
            id: row.id,
            reservation_id: row.reservation_id,
            name: row.name,
            email: row.email,
            qr_code: row.qr_code,
            token_hash: row.token_hash,
            attended: row.attended,
            validated_at: row.validated_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub transaction_id: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            id: row.id,
            reservation_id: row.reservation_id,
            amount: row.amount,
            method: row.method,
            transaction_id: row.transaction_id,
            state: row.state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    pub kind: String,
    pub magnitude: Decimal,
    pub expires_on: Option<NaiveDate>,
    pub owner_id: Option<Uuid>,
    pub state: String,
    pub reservation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = AppError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Coupon {
            id: row.id,
            code: row.code,
            kind: row.kind.parse()?,
            magnitude: row.magnitude,
            expires_on: row.expires_on,
            owner_id: row.owner_id,
            state: row.state.parse()?,
            reservation_id: row.reservation_id,
            created_at: row.created_at,
        })
    }
}

pub fn reservations(rows: Vec<ReservationRow>) -> Result<Vec<Reservation>, AppError> {
    rows.into_iter().map(Reservation::try_from).collect()
}
