//! Trip records and the CSV loader that produces them.
//!
//! Every field is optional: a value that is empty or fails to parse loads as
//! `None` and is later caught by the rule that reads it. Only a missing
//! column is a load error.

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::Read;
use tracing::{debug, info};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column names of the yellow-taxi trip export, in output order.
pub const COLUMNS: &[&str] = &[
    "VendorID",
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
    "trip_distance",
    "RatecodeID",
    "PULocationID",
    "DOLocationID",
    "payment_type",
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
    "congestion_surcharge",
    "Airport_fee",
    "cbd_congestion_fee",
];

/// One ride as loaded from the source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    #[serde(rename = "VendorID", deserialize_with = "csv::invalid_option")]
    pub vendor_id: Option<i64>,
    #[serde(rename = "tpep_pickup_datetime", deserialize_with = "lenient_datetime")]
    pub pickup_datetime: Option<NaiveDateTime>,
    #[serde(rename = "tpep_dropoff_datetime", deserialize_with = "lenient_datetime")]
    pub dropoff_datetime: Option<NaiveDateTime>,
    #[serde(deserialize_with = "lenient_count")]
    pub passenger_count: Option<i64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub trip_distance: Option<f64>,
    #[serde(rename = "RatecodeID", deserialize_with = "lenient_count")]
    pub rate_code: Option<i64>,
    #[serde(rename = "PULocationID", deserialize_with = "csv::invalid_option")]
    pub pickup_location: Option<i64>,
    #[serde(rename = "DOLocationID", deserialize_with = "csv::invalid_option")]
    pub dropoff_location: Option<i64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub payment_type: Option<i64>,

    #[serde(deserialize_with = "csv::invalid_option")]
    pub fare_amount: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub extra: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub mta_tax: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub tip_amount: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub tolls_amount: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub improvement_surcharge: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub total_amount: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub congestion_surcharge: Option<f64>,
    #[serde(rename = "Airport_fee", deserialize_with = "csv::invalid_option")]
    pub airport_fee: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub cbd_congestion_fee: Option<f64>,
}

impl TripRecord {
    /// Date and hour of pickup, the key used to join weather observations.
    pub fn pickup_hour_key(&self) -> Option<(NaiveDate, u32)> {
        self.pickup_datetime.map(|t| (t.date(), t.hour()))
    }

    /// Sum of every itemized charge. `None` if any component is missing.
    pub fn itemized_total(&self) -> Option<f64> {
        let parts = [
            self.fare_amount?,
            self.extra?,
            self.mta_tax?,
            self.tip_amount?,
            self.tolls_amount?,
            self.improvement_surcharge?,
            self.congestion_surcharge?,
            self.airport_fee?,
            self.cbd_congestion_fee?,
        ];
        Some(parts.iter().sum())
    }

    /// Field values rendered in [`COLUMNS`] order; absent values are empty.
    pub fn csv_fields(&self) -> Vec<String> {
        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(ToString::to_string).unwrap_or_default()
        }
        fn ts(v: &Option<NaiveDateTime>) -> String {
            v.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default()
        }

        vec![
            opt(&self.vendor_id),
            ts(&self.pickup_datetime),
            ts(&self.dropoff_datetime),
            opt(&self.passenger_count),
            opt(&self.trip_distance),
            opt(&self.rate_code),
            opt(&self.pickup_location),
            opt(&self.dropoff_location),
            opt(&self.payment_type),
            opt(&self.fare_amount),
            opt(&self.extra),
            opt(&self.mta_tax),
            opt(&self.tip_amount),
            opt(&self.tolls_amount),
            opt(&self.improvement_surcharge),
            opt(&self.total_amount),
            opt(&self.congestion_surcharge),
            opt(&self.airport_fee),
            opt(&self.cbd_congestion_fee),
        ]
    }
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
            .ok()
    }))
}

/// Integer columns are exported as floats (`1.0`) in some months.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let s = s.trim();
        s.parse::<i64>().ok().or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        })
    }))
}

/// Loads every trip from a CSV file, in file order.
///
/// # Errors
///
/// Fails if the file cannot be read or a required column is missing.
/// Malformed values inside a row never fail the load.
#[tracing::instrument]
pub fn load_trips(path: &str) -> Result<Vec<TripRecord>> {
    let file = File::open(path).with_context(|| format!("failed to open trip file '{path}'"))?;
    let trips = read_trips(file).with_context(|| format!("failed to load trips from '{path}'"))?;
    info!(records = trips.len(), "Trip records loaded");
    Ok(trips)
}

/// Reads trips from any CSV source. See [`load_trips`].
pub fn read_trips<R: Read>(reader: R) -> Result<Vec<TripRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<&str> = COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h.trim() == *c))
        .collect();
    if !missing.is_empty() {
        bail!("missing required column(s): {}", missing.join(", "));
    }

    let mut trips = Vec::new();
    for (line, result) in rdr.deserialize::<TripRecord>().enumerate() {
        match result {
            Ok(trip) => trips.push(trip),
            Err(e) => {
                // short rows and the like still count as records, all fields absent
                debug!(line = line + 2, error = %e, "Unreadable trip row");
                trips.push(TripRecord::default());
            }
        }
    }

    Ok(trips)
}
