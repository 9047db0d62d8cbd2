//! Bookable time windows derived from a court's operating hours.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::models::reservation::TimeWindow;
use crate::models::resource::Resource;

pub const SLOT_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start,
            end: self.end,
        }
    }
}

/// Iterator over the whole one-hour slots of a court on `date`.
///
/// Cloning the iterator restarts the sequence from the clone's position;
/// calling [`slots`] again always starts from opening time.
#[derive(Debug, Clone)]
pub struct Slots {
    date: NaiveDate,
    next_start: Option<NaiveTime>,
    closing: NaiveTime,
    step: Duration,
}

impl Iterator for Slots {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let start = self.next_start?;
        let (end, wrapped) = start.overflowing_add_signed(self.step);
        if wrapped != 0 || end > self.closing {
            self.next_start = None;
            return None;
        }
        self.next_start = Some(end);
        Some(Slot {
            date: self.date,
            start,
            end,
        })
    }
}

pub fn slots(resource: &Resource, date: NaiveDate) -> Slots {
    let next_start = (resource.opening_time < resource.closing_time).then_some(resource.opening_time);
    Slots {
        date,
        next_start,
        closing: resource.closing_time,
        step: Duration::minutes(SLOT_MINUTES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resource::ResourceState;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn court(open: (u32, u32), close: (u32, u32)) -> Resource {
        Resource {
            id: Uuid::new_v4(),
            name: "Cancha 1".into(),
            opening_time: NaiveTime::from_hms_opt(open.0, open.1, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(close.0, close.1, 0).unwrap(),
            hourly_rate: dec!(100),
            state: ResourceState::Available,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn test_hourly_slots_between_opening_and_closing() {
        let all: Vec<Slot> = slots(&court((8, 0), (12, 0)), day()).collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(all[3].end, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        for pair in all.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_partial_trailing_hour_is_not_a_slot() {
        let all: Vec<Slot> = slots(&court((8, 0), (10, 30)), day()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].end, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    }

    #[test]
    fn test_closing_at_or_before_opening_yields_nothing() {
        assert_eq!(slots(&court((10, 0), (10, 0)), day()).count(), 0);
        assert_eq!(slots(&court((22, 0), (6, 0)), day()).count(), 0);
    }

    #[test]
    fn test_last_slot_may_end_at_midnight_boundary() {
        let all: Vec<Slot> = slots(&court((21, 0), (23, 59)), day()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].start, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
    }

    #[test]
    fn test_restartable() {
        let resource = court((9, 0), (11, 0));
        let first: Vec<Slot> = slots(&resource, day()).collect();
        let second: Vec<Slot> = slots(&resource, day()).collect();
        assert_eq!(first, second);
    }
}
