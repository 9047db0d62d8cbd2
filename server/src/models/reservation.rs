use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Pending => "pending",
            ReservationState::Confirmed => "confirmed",
            ReservationState::InProgress => "in_progress",
            ReservationState::Completed => "completed",
            ReservationState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationState::Completed | ReservationState::Cancelled
        )
    }

    /// Returns the state reached by `transition`, or `InvalidState` when the
    /// transition is not legal from `self`.
    pub fn apply(self, transition: Transition) -> Result<ReservationState, AppError> {
        use ReservationState::*;

        let next = match (self, transition) {
            (Pending, Transition::Confirm) => Confirmed,
            (Confirmed, Transition::Begin) => InProgress,
            (InProgress, Transition::Complete) => Completed,
            (Pending | Confirmed, Transition::Cancel) => Cancelled,
            (current, transition) => {
                return Err(AppError::InvalidState {
                    current,
                    action: transition.verb(),
                })
            }
        };
        Ok(next)
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationState::Pending),
            "confirmed" => Ok(ReservationState::Confirmed),
            "in_progress" => Ok(ReservationState::InProgress),
            "completed" => Ok(ReservationState::Completed),
            "cancelled" => Ok(ReservationState::Cancelled),
            other => Err(AppError::InternalServerError(format!(
                "unknown reservation state '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Begin,
    Complete,
    Cancel,
}

impl Transition {
    pub fn verb(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Begin => "begin",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
        }
    }
}

/// A half-open `[start, end)` interval on a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        if start >= end {
            return Err(AppError::ValidationError(format!(
                "start time {start} must be before end time {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub code: String,
    pub resource_id: Uuid,
    pub owner_id: Uuid,
    pub discipline_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub attendee_count: i32,
    pub cost: Decimal,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

/// Everything needed to persist a new booking in one transaction.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub id: Uuid,
    pub code: String,
    pub resource_id: Uuid,
    pub owner_id: Uuid,
    pub discipline_id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub cost: Decimal,
    pub attendees: Vec<crate::models::attendee::Attendee>,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    /// Coupon validity is judged against this day.
    pub today: NaiveDate,
}
