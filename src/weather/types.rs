//! Hourly observation model and unit conversion.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Precipitation category of one hour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precipitation {
    #[default]
    None,
    Rain,
    Snow,
    /// Sleet, freezing rain, or rain and snow together.
    Mixed,
}

impl Precipitation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::Mixed => "mixed",
        }
    }

    /// Classifies the provider's precipitation type list.
    pub fn from_types<S: AsRef<str>>(types: &[S]) -> Self {
        let has = |name: &str| types.iter().any(|t| t.as_ref().eq_ignore_ascii_case(name));
        let icy = has("freezingrain") || has("ice") || has("sleet");
        match (has("rain"), has("snow")) {
            _ if icy => Self::Mixed,
            (true, true) => Self::Mixed,
            (true, false) => Self::Rain,
            (false, true) => Self::Snow,
            (false, false) => Self::None,
        }
    }
}

/// One weather sample for a (date, hour) key, in metric units.
///
/// Also the row format of the on-disk cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyObservation {
    pub date: NaiveDate,
    pub hour: u32,
    pub temperature_c: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub visibility_km: Option<f64>,
    pub precipitation: Precipitation,
}

impl HourlyObservation {
    pub fn key(&self) -> (NaiveDate, u32) {
        (self.date, self.hour)
    }

    /// Builds an observation from US-customary readings.
    pub fn from_us_units(
        date: NaiveDate,
        hour: u32,
        temperature_f: Option<f64>,
        wind_speed_mph: Option<f64>,
        visibility_mi: Option<f64>,
        precipitation: Precipitation,
    ) -> Self {
        Self {
            date,
            hour,
            temperature_c: temperature_f.map(fahrenheit_to_celsius),
            wind_speed_kmh: wind_speed_mph.map(miles_to_km),
            visibility_km: visibility_mi.map(miles_to_km),
            precipitation,
        }
    }
}

const KM_PER_MILE: f64 = 1.609344;

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn miles_to_km(mi: f64) -> f64 {
    mi * KM_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 1e-9);
        assert!((miles_to_km(10.0) - 16.09344).abs() < 1e-9);
    }

    #[test]
    fn test_from_us_units_converts_every_field() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let obs = HourlyObservation::from_us_units(
            date,
            7,
            Some(50.0),
            Some(5.0),
            None,
            Precipitation::Rain,
        );

        assert_eq!(obs.key(), (date, 7));
        assert!((obs.temperature_c.unwrap() - 10.0).abs() < 1e-9);
        assert!((obs.wind_speed_kmh.unwrap() - 8.04672).abs() < 1e-9);
        assert_eq!(obs.visibility_km, None);
    }

    #[test]
    fn test_precipitation_categories() {
        assert_eq!(Precipitation::from_types::<&str>(&[]), Precipitation::None);
        assert_eq!(Precipitation::from_types(&["rain"]), Precipitation::Rain);
        assert_eq!(Precipitation::from_types(&["Snow"]), Precipitation::Snow);
        assert_eq!(Precipitation::from_types(&["rain", "snow"]), Precipitation::Mixed);
        assert_eq!(Precipitation::from_types(&["freezingrain"]), Precipitation::Mixed);
    }
}
