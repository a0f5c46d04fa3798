//! Time-of-day surcharge schedule.

use crate::config::ValidationConfig;
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

fn in_hours(hour: u32, (start, end): (u32, u32)) -> bool {
    if start <= end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

pub fn is_weekday(at: NaiveDateTime) -> bool {
    !matches!(at.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Weekday, inside the rush window, and not on a listed holiday.
pub fn is_rush_hour(at: NaiveDateTime, config: &ValidationConfig) -> bool {
    is_weekday(at) && in_hours(at.hour(), config.rush_hours) && !config.is_holiday(at.date())
}

pub fn is_overnight(at: NaiveDateTime, config: &ValidationConfig) -> bool {
    in_hours(at.hour(), config.overnight_hours)
}

/// The only surcharge value allowed for a trip picked up at `at`.
pub fn permitted_surcharge(at: NaiveDateTime, config: &ValidationConfig) -> f64 {
    if is_rush_hour(at, config) {
        config.rush_hour_surcharge
    } else if is_overnight(at, config) {
        config.overnight_surcharge
    } else {
        0.0
    }
}
