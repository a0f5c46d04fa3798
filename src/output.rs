//! Audit and clean artifacts, and the run summary.
//!
//! The audit artifact holds every record as loaded, the corrected values, and
//! every indicator. The clean artifact holds only valid records with weather.

use anyhow::{Context, Result};
use csv::Writer;
use std::path::Path;
use tracing::{debug, info};

use crate::enrich::{EnrichedRecord, WeatherFlags};
use crate::flags::{Evaluation, VALID_FLAG, flag_names};
use crate::record::{COLUMNS, TIMESTAMP_FORMAT, TripRecord};
use crate::stats::ValidationSummary;

const CORRECTED_COLUMNS: &[&str] = &[
    "corrected_pickup_datetime",
    "corrected_dropoff_datetime",
    "corrected_passenger_count",
];

const WEATHER_COLUMNS: &[&str] = &[
    "temperature_c",
    "wind_speed_kmh",
    "visibility_km",
    "precipitation",
];

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn corrected_fields(r: &TripRecord) -> Vec<String> {
    vec![
        opt(r.pickup_datetime.map(|t| t.format(TIMESTAMP_FORMAT))),
        opt(r.dropoff_datetime.map(|t| t.format(TIMESTAMP_FORMAT))),
        opt(r.passenger_count),
    ]
}

/// Writes the full record set with every indicator and `is_valid_record`.
#[tracing::instrument(skip(evaluation), fields(records = evaluation.records().len()))]
pub fn write_audit(path: &str, evaluation: &Evaluation) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("failed to create audit file '{path}'"))?;

    let mut header: Vec<&str> = COLUMNS.to_vec();
    header.extend_from_slice(CORRECTED_COLUMNS);
    header.extend(flag_names());
    header.push(VALID_FLAG);
    writer.write_record(&header)?;

    for row in evaluation.records() {
        let mut fields = row.original.csv_fields();
        fields.extend(corrected_fields(&row.corrected));
        fields.extend(row.indicators.values().iter().map(bool::to_string));
        fields.push(row.is_valid().to_string());
        writer.write_record(&fields)?;
    }
    writer.flush()?;

    info!(path, "Audit artifact written");
    Ok(())
}

/// Writes valid, weather-enriched records.
#[tracing::instrument(skip(records), fields(records = records.len()))]
pub fn write_clean(path: &str, records: &[EnrichedRecord]) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("failed to create clean file '{path}'"))?;

    let mut header: Vec<&str> = COLUMNS.to_vec();
    header.extend_from_slice(WEATHER_COLUMNS);
    header.extend_from_slice(&WeatherFlags::NAMES);
    writer.write_record(&header)?;

    for row in records {
        let mut fields = row.trip.csv_fields();
        let obs = row.observation.as_ref();
        fields.push(opt(obs.and_then(|o| o.temperature_c)));
        fields.push(opt(obs.and_then(|o| o.wind_speed_kmh)));
        fields.push(opt(obs.and_then(|o| o.visibility_km)));
        fields.push(opt(obs.map(|o| o.precipitation.as_str())));
        fields.extend(row.flags.values().iter().map(|f| opt(*f)));
        writer.write_record(&fields)?;
    }
    writer.flush()?;

    info!(path, "Clean artifact written");
    Ok(())
}

/// Writes the summary as pretty JSON.
pub fn write_summary(path: &str, summary: &ValidationSummary) -> Result<()> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)
        .with_context(|| format!("failed to write summary '{path}'"))?;
    debug!(path, "Summary written");
    Ok(())
}

/// Logs one line per raised flag, then the totals.
pub fn log_summary(summary: &ValidationSummary) {
    for flag in summary.flags.iter().filter(|f| f.count > 0) {
        info!(
            flag = %flag.flag,
            count = flag.count,
            pct = %format!("{:.2}", flag.percentage),
            "Flag raised"
        );
    }
    info!(
        original = summary.original_count,
        valid = summary.valid_count,
        invalid = summary.invalid_count,
        clean = ?summary.clean_count,
        dropped = ?summary.dropped_count,
        missing_weather = ?summary.missing_weather,
        accounted = summary.is_accounted(),
        "Validation summary"
    );
}

/// Logs the summary as pretty-printed JSON.
pub fn print_json(summary: &ValidationSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
