//! Automatic repairs applied before validation.
//!
//! A repair never overwrites the loaded record: it returns a corrected copy
//! and a provenance bit saying whether anything changed.

use crate::config::ValidationConfig;
use crate::record::TripRecord;

/// A corrected copy of a record and what was done to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Corrected {
    pub record: TripRecord,
    pub swapped_datetime: bool,
    pub reset_passenger_count: bool,
}

/// Swaps pickup and dropoff when dropoff precedes pickup.
///
/// Idempotent: a record that went through once comes back unchanged.
pub fn swap_reversed_times(record: &TripRecord) -> (TripRecord, bool) {
    let mut out = record.clone();
    match (record.pickup_datetime, record.dropoff_datetime) {
        (Some(pickup), Some(dropoff)) if dropoff < pickup => {
            out.pickup_datetime = Some(dropoff);
            out.dropoff_datetime = Some(pickup);
            (out, true)
        }
        _ => (out, false),
    }
}

/// Replaces a missing or out-of-range passenger count with the default.
pub fn reset_passenger_count(record: &TripRecord, config: &ValidationConfig) -> (TripRecord, bool) {
    let (lo, hi) = config.passenger_count_range;
    let in_range = record
        .passenger_count
        .is_some_and(|n| (lo..=hi).contains(&n));

    let mut out = record.clone();
    if in_range {
        (out, false)
    } else {
        out.passenger_count = Some(config.passenger_count_default);
        (out, true)
    }
}

/// Runs every repair once, in order.
pub fn correct(record: &TripRecord, config: &ValidationConfig) -> Corrected {
    let (swapped, swapped_datetime) = swap_reversed_times(record);
    let (record, reset_passenger_count) = reset_passenger_count(&swapped, config);
    Corrected {
        record,
        swapped_datetime,
        reset_passenger_count,
    }
}
