use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::reservation::{Reservation, TimeWindow};
use crate::repository::{ReservationRepository, ResourceRepository};
use crate::services::pricing;
use crate::services::slots::slots;
use crate::utils::error::{AppError, AppResult};

/// One row of a court's availability board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub start: chrono::NaiveTime,
    pub end: chrono::NaiveTime,
    pub is_free: bool,
    pub price: Decimal,
}

/// Whether `window` is clear of every active reservation except `exclude`.
pub fn window_is_free(
    active: &[Reservation],
    window: &TimeWindow,
    exclude: Option<Uuid>,
) -> bool {
    !active
        .iter()
        .filter(|r| !r.state.is_terminal())
        .filter(|r| Some(r.id) != exclude)
        .any(|r| r.window().overlaps(window))
}

pub struct AvailabilityChecker {
    resources: Arc<dyn ResourceRepository>,
    reservations: Arc<dyn ReservationRepository>,
}

impl AvailabilityChecker {
    pub fn new(
        resources: Arc<dyn ResourceRepository>,
        reservations: Arc<dyn ReservationRepository>,
    ) -> Self {
        Self {
            resources,
            reservations,
        }
    }

    /// Read-only check. Booking re-validates inside its own transaction.
    pub async fn is_available(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
        window: &TimeWindow,
        exclude_reservation_id: Option<Uuid>,
    ) -> AppResult<bool> {
        let active = self.reservations.find_active_on(resource_id, date).await?;
        Ok(window_is_free(&active, window, exclude_reservation_id))
    }

    pub async fn board(&self, resource_id: Uuid, date: NaiveDate) -> AppResult<Vec<SlotView>> {
        let resource = self
            .resources
            .find_by_id(resource_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Court '{resource_id}' was not found")))?;
        let active = self.reservations.find_active_on(resource_id, date).await?;
        let bookable = resource.is_bookable();

        Ok(slots(&resource, date)
            .map(|slot| {
                let window = slot.window();
                SlotView {
                    start: slot.start,
                    end: slot.end,
                    is_free: bookable && window_is_free(&active, &window, None),
                    price: pricing::price(&resource, &window),
                }
            })
            .collect())
    }
}
