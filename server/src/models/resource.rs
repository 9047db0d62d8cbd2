use std::str::FromStr;

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::reservation::TimeWindow;
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Available,
    Maintenance,
    Inactive,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Available => "available",
            ResourceState::Maintenance => "maintenance",
            ResourceState::Inactive => "inactive",
        }
    }
}

impl FromStr for ResourceState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(ResourceState::Available),
            "maintenance" => Ok(ResourceState::Maintenance),
            "inactive" => Ok(ResourceState::Inactive),
            other => Err(AppError::InternalServerError(format!(
                "unknown court state '{other}'"
            ))),
        }
    }
}

/// A bookable court.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub hourly_rate: Decimal,
    pub state: ResourceState,
}

impl Resource {
    pub fn is_bookable(&self) -> bool {
        self.state == ResourceState::Available
    }

    /// Whether `window` lies inside `[opening, closing]`.
    pub fn covers(&self, window: &TimeWindow) -> bool {
        window.start >= self.opening_time && window.end <= self.closing_time
    }
}
