//! Per-field validity rules.
//!
//! Each [`Rule`] is a pure predicate over one record and a [`RuleContext`];
//! it answers "is this field invalid?" and nothing else. Rules never touch
//! other records and never mutate anything, so they can run in any order and
//! on any thread once the record has been corrected.

pub mod calendar;
pub mod catalog;

use crate::config::ValidationConfig;
use crate::record::TripRecord;
use crate::zones::{Region, ZoneRegistry};
use serde::Serialize;

/// The fixed catalog of validity rules, one indicator flag each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Rule {
    VendorId,
    PickupDatetime,
    DropoffDatetime,
    TripDuration,
    PassengerCount,
    TripDistance,
    RateCode,
    Location,
    PaymentType,
    FareAmount,
    FlatFare,
    Extra,
    MtaTax,
    TipAmount,
    TollsAmount,
    ImprovementSurcharge,
    CongestionSurcharge,
    AirportFee,
    CbdCongestionFee,
    TotalAmount,
}

impl Rule {
    pub const ALL: [Rule; 20] = [
        Rule::VendorId,
        Rule::PickupDatetime,
        Rule::DropoffDatetime,
        Rule::TripDuration,
        Rule::PassengerCount,
        Rule::TripDistance,
        Rule::RateCode,
        Rule::Location,
        Rule::PaymentType,
        Rule::FareAmount,
        Rule::FlatFare,
        Rule::Extra,
        Rule::MtaTax,
        Rule::TipAmount,
        Rule::TollsAmount,
        Rule::ImprovementSurcharge,
        Rule::CongestionSurcharge,
        Rule::AirportFee,
        Rule::CbdCongestionFee,
        Rule::TotalAmount,
    ];

    /// Name of the indicator column this rule raises.
    pub fn flag_name(&self) -> &'static str {
        match self {
            Rule::VendorId => "is_invalid_vendor_id",
            Rule::PickupDatetime => "is_invalid_pickup_datetime",
            Rule::DropoffDatetime => "is_invalid_dropoff_datetime",
            Rule::TripDuration => "is_invalid_trip_duration",
            Rule::PassengerCount => "is_invalid_passenger_count",
            Rule::TripDistance => "is_invalid_trip_distance",
            Rule::RateCode => "is_invalid_rate_code",
            Rule::Location => "is_invalid_location",
            Rule::PaymentType => "is_invalid_payment_type",
            Rule::FareAmount => "is_invalid_fare_amount",
            Rule::FlatFare => "is_invalid_flat_fare",
            Rule::Extra => "is_invalid_extra",
            Rule::MtaTax => "is_invalid_mta_tax",
            Rule::TipAmount => "is_invalid_tip_amount",
            Rule::TollsAmount => "is_invalid_tolls_amount",
            Rule::ImprovementSurcharge => "is_invalid_improvement_surcharge",
            Rule::CongestionSurcharge => "is_invalid_congestion_surcharge",
            Rule::AirportFee => "is_invalid_airport_fee",
            Rule::CbdCongestionFee => "is_invalid_cbd_congestion_fee",
            Rule::TotalAmount => "is_invalid_total_amount",
        }
    }

    /// Rules whose field has a repair are judged on the value as loaded, so
    /// the repair cannot hide the evidence.
    pub fn reads_original(&self) -> bool {
        matches!(self, Rule::PassengerCount)
    }
}

/// Everything a rule may consult besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub config: &'a ValidationConfig,
    pub zones: &'a ZoneRegistry,
    pub pickup_region: Option<Region>,
    pub dropoff_region: Option<Region>,
}

impl<'a> RuleContext<'a> {
    pub fn for_record(
        config: &'a ValidationConfig,
        zones: &'a ZoneRegistry,
        record: &TripRecord,
    ) -> Self {
        Self {
            config,
            zones,
            pickup_region: record.pickup_location.and_then(|id| zones.region(id)),
            dropoff_region: record.dropoff_location.and_then(|id| zones.region(id)),
        }
    }
}

/// Dispatches a [`Rule`] to its predicate.
pub fn is_invalid(rule: Rule, record: &TripRecord, ctx: &RuleContext<'_>) -> bool {
    use catalog::*;

    match rule {
        Rule::VendorId => invalid_vendor_id(record, ctx),
        Rule::PickupDatetime => invalid_pickup_datetime(record, ctx),
        Rule::DropoffDatetime => invalid_dropoff_datetime(record, ctx),
        Rule::TripDuration => invalid_trip_duration(record, ctx),
        Rule::PassengerCount => invalid_passenger_count(record, ctx),
        Rule::TripDistance => invalid_trip_distance(record, ctx),
        Rule::RateCode => invalid_rate_code(record, ctx),
        Rule::Location => invalid_location(record, ctx),
        Rule::PaymentType => invalid_payment_type(record, ctx),
        Rule::FareAmount => invalid_fare_amount(record, ctx),
        Rule::FlatFare => invalid_flat_fare(record, ctx),
        Rule::Extra => invalid_extra(record, ctx),
        Rule::MtaTax => invalid_mta_tax(record, ctx),
        Rule::TipAmount => invalid_tip_amount(record, ctx),
        Rule::TollsAmount => invalid_tolls_amount(record, ctx),
        Rule::ImprovementSurcharge => invalid_improvement_surcharge(record, ctx),
        Rule::CongestionSurcharge => invalid_congestion_surcharge(record, ctx),
        Rule::AirportFee => invalid_airport_fee(record, ctx),
        Rule::CbdCongestionFee => invalid_cbd_congestion_fee(record, ctx),
        Rule::TotalAmount => invalid_total_amount(record, ctx),
    }
}
