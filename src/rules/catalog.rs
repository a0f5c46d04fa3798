//! Rule predicates. Each returns `true` when the field is invalid; a field
//! that is absent is invalid for every rule that reads it.

use super::RuleContext;
use super::calendar::permitted_surcharge;
use crate::record::TripRecord;

/// Slack for float noise on top of an explicit tolerance.
const EPSILON: f64 = 1e-9;

fn within(value: f64, target: f64, tolerance: f64) -> bool {
    (value - target).abs() <= tolerance + EPSILON
}

/// Invalid unless `value` is present and close to one of `allowed`.
fn not_one_of(value: Option<f64>, allowed: &[f64], tolerance: f64) -> bool {
    match value {
        Some(v) => !allowed.iter().any(|a| within(v, *a, tolerance)),
        None => true,
    }
}

fn not_member(value: Option<i64>, allowed: &[i64]) -> bool {
    value.is_none_or(|v| !allowed.contains(&v))
}

fn outside<T: PartialOrd>(value: Option<T>, (lo, hi): (T, T)) -> bool {
    value.is_none_or(|v| v < lo || v > hi)
}

pub fn invalid_vendor_id(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    not_member(r.vendor_id, &ctx.config.vendor_ids)
}

/// Pickup may fall in the reporting month or the one before it; trips are
/// billed to the month they end in.
pub fn invalid_pickup_datetime(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let period = ctx.config.period;
    r.pickup_datetime
        .is_none_or(|t| !period.contains(t.date()) && !period.previous().contains(t.date()))
}

pub fn invalid_dropoff_datetime(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    r.dropoff_datetime
        .is_none_or(|t| !ctx.config.period.contains(t.date()))
}

pub fn invalid_trip_duration(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    match (r.pickup_datetime, r.dropoff_datetime) {
        (Some(pickup), Some(dropoff)) => {
            let duration = dropoff - pickup;
            let seconds = duration.num_seconds();
            seconds <= 0 || seconds > ctx.config.max_trip_hours.saturating_mul(3600)
        }
        _ => true,
    }
}

pub fn invalid_passenger_count(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    outside(r.passenger_count, ctx.config.passenger_count_range)
}

pub fn invalid_trip_distance(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    outside(r.trip_distance, ctx.config.trip_distance_range)
}

pub fn invalid_rate_code(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    not_member(r.rate_code, &ctx.config.rate_codes)
}

pub fn invalid_location(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let known = |id: Option<i64>| id.is_some_and(|id| ctx.zones.contains(id));
    !known(r.pickup_location) || !known(r.dropoff_location)
}

pub fn invalid_payment_type(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    not_member(r.payment_type, &ctx.config.payment_types)
}

fn is_flat_rate(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    r.rate_code == Some(ctx.config.flat_rate_code)
}

/// Metered fare range. Flat-rate trips are judged by [`invalid_flat_fare`].
pub fn invalid_fare_amount(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    if is_flat_rate(r, ctx) {
        return false;
    }
    let c = ctx.config;
    r.fare_amount.is_none_or(|fare| {
        fare < c.min_fare - c.monetary_tolerance || fare > c.max_fare + c.monetary_tolerance
    })
}

/// Flat-rate fares must match exactly, no tolerance.
pub fn invalid_flat_fare(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    if !is_flat_rate(r, ctx) {
        return false;
    }
    r.fare_amount != Some(ctx.config.flat_rate_fare)
}

pub fn invalid_extra(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    match (r.pickup_datetime, r.extra) {
        (Some(pickup), Some(extra)) => {
            let permitted = permitted_surcharge(pickup, ctx.config);
            !within(extra, permitted, ctx.config.monetary_tolerance)
        }
        _ => true,
    }
}

/// Charged when either end of the trip is in a named borough, zero otherwise.
pub fn invalid_mta_tax(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let in_city = [ctx.pickup_region, ctx.dropoff_region]
        .iter()
        .flatten()
        .any(|region| region.is_named());
    let expected = if in_city { ctx.config.mta_tax } else { 0.0 };
    not_one_of(r.mta_tax, &[expected], ctx.config.monetary_tolerance)
}

/// Tips are only recorded on electronic payments.
pub fn invalid_tip_amount(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    match r.tip_amount {
        Some(tip) if tip < 0.0 => true,
        Some(tip) => r.payment_type == Some(ctx.config.cash_payment_type) && tip > 0.0,
        None => true,
    }
}

pub fn invalid_tolls_amount(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    outside(r.tolls_amount, (0.0, ctx.config.max_tolls))
}

pub fn invalid_improvement_surcharge(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let c = ctx.config;
    not_one_of(
        r.improvement_surcharge,
        &[0.0, c.improvement_surcharge],
        c.monetary_tolerance,
    )
}

pub fn invalid_congestion_surcharge(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let c = ctx.config;
    not_one_of(
        r.congestion_surcharge,
        &[0.0, c.congestion_surcharge],
        c.monetary_tolerance,
    )
}

/// Only pickups at an airport zone may carry the fee.
pub fn invalid_airport_fee(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let c = ctx.config;
    let at_airport = r
        .pickup_location
        .is_some_and(|id| c.airport_location_ids.contains(&id));
    if at_airport {
        not_one_of(r.airport_fee, &[0.0, c.airport_fee], c.monetary_tolerance)
    } else {
        not_one_of(r.airport_fee, &[0.0], c.monetary_tolerance)
    }
}

pub fn invalid_cbd_congestion_fee(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    let c = ctx.config;
    not_one_of(
        r.cbd_congestion_fee,
        &[0.0, c.cbd_congestion_fee],
        c.monetary_tolerance,
    )
}

/// Declared total against the itemized sum, within `total_tolerance`.
pub fn invalid_total_amount(r: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    match (r.total_amount, r.itemized_total()) {
        (Some(total), Some(sum)) => !within(total, sum, ctx.config.total_tolerance),
        _ => true,
    }
}
