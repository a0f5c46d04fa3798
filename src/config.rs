//! Immutable configuration for validation and weather fetching.
//!
//! Values come from built-in defaults, then environment variables (a `.env`
//! file is loaded by the binary with `dotenvy`), then CLI flags.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// The calendar month a dataset is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportingPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("month must be between 1 and 12, got {month}");
        }
        Ok(Self { year, month })
    }

    pub fn first_day(&self) -> NaiveDate {
        // month is validated on construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// The period immediately before this one.
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Every calendar day in the period, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.first_day()
            .iter_days()
            .take_while(|d| self.contains(*d))
            .collect()
    }

    /// Every (date, hour) key in the period, in order.
    pub fn hours(&self) -> Vec<(NaiveDate, u32)> {
        self.days()
            .into_iter()
            .flat_map(|d| (0..24).map(move |h| (d, h)))
            .collect()
    }
}

impl std::fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Thresholds, enumerations and calendar data consumed by the rule catalog.
///
/// Built once and shared read-only; rules never consult ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub period: ReportingPeriod,

    pub vendor_ids: Vec<i64>,
    pub rate_codes: Vec<i64>,
    pub payment_types: Vec<i64>,
    pub cash_payment_type: i64,
    pub flat_rate_code: i64,

    pub passenger_count_range: (i64, i64),
    pub passenger_count_default: i64,
    pub trip_distance_range: (f64, f64),
    pub max_trip_hours: i64,

    pub flat_rate_fare: f64,
    pub min_fare: f64,
    pub max_fare: f64,
    pub max_tolls: f64,

    pub rush_hour_surcharge: f64,
    pub overnight_surcharge: f64,
    /// Half-open `[start, end)` hour range.
    pub rush_hours: (u32, u32),
    /// Wraps past midnight, `[start, 24) ∪ [0, end)`.
    pub overnight_hours: (u32, u32),
    pub holidays: Vec<NaiveDate>,

    pub mta_tax: f64,
    pub improvement_surcharge: f64,
    pub congestion_surcharge: f64,
    pub airport_fee: f64,
    pub airport_location_ids: Vec<i64>,
    pub cbd_congestion_fee: f64,

    pub monetary_tolerance: f64,
    pub total_tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            period: ReportingPeriod {
                year: 2025,
                month: 1,
            },
            vendor_ids: vec![1, 2, 6, 7],
            rate_codes: vec![1, 2, 3, 4, 5, 6],
            payment_types: vec![1, 2, 3, 4, 5, 6],
            cash_payment_type: 2,
            flat_rate_code: 2,
            passenger_count_range: (1, 6),
            passenger_count_default: 1,
            trip_distance_range: (0.01, 200.0),
            max_trip_hours: 24,
            flat_rate_fare: 70.0,
            min_fare: 3.0,
            max_fare: 1000.0,
            max_tolls: 200.0,
            rush_hour_surcharge: 2.5,
            overnight_surcharge: 1.0,
            rush_hours: (16, 20),
            overnight_hours: (20, 6),
            holidays: default_holidays(),
            mta_tax: 0.5,
            improvement_surcharge: 1.0,
            congestion_surcharge: 2.5,
            airport_fee: 1.75,
            airport_location_ids: vec![132, 138],
            cbd_congestion_fee: 0.75,
            monetary_tolerance: 0.01,
            total_tolerance: 1.5,
        }
    }
}

impl ValidationConfig {
    pub fn for_period(period: ReportingPeriod) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Loads overrides from a JSON file; omitted keys keep their defaults.
    pub fn from_json_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read validation config '{path}'"))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse validation config '{path}'"))?;
        Ok(config)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}

/// US federal holidays observed by the surcharge schedule.
fn default_holidays() -> Vec<NaiveDate> {
    [
        (2024, 1, 1),
        (2024, 1, 15),
        (2024, 2, 19),
        (2024, 5, 27),
        (2024, 6, 19),
        (2024, 7, 4),
        (2024, 9, 2),
        (2024, 10, 14),
        (2024, 11, 11),
        (2024, 11, 28),
        (2024, 12, 25),
        (2025, 1, 1),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 10, 13),
        (2025, 11, 11),
        (2025, 11, 27),
        (2025, 12, 25),
    ]
    .into_iter()
    .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    .collect()
}

/// Settings for the hourly weather fetcher and its on-disk cache.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub location: String,
    pub cache_dir: PathBuf,
    pub min_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url:
                "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline"
                    .to_string(),
            api_key: None,
            location: "New York,NY".to_string(),
            cache_dir: PathBuf::from("weather_cache"),
            min_interval: Duration::from_millis(1000),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl WeatherConfig {
    /// Builds the config from `WEATHER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("WEATHER_API_BASE_URL") {
            config.base_url = url;
        }
        config.api_key = std::env::var("WEATHER_API_KEY").ok();
        if let Ok(location) = std::env::var("WEATHER_LOCATION") {
            config.location = location;
        }
        if let Ok(dir) = std::env::var("WEATHER_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Some(ms) = env_number::<u64>("WEATHER_MIN_INTERVAL_MS")? {
            config.min_interval = Duration::from_millis(ms);
        }
        if let Some(retries) = env_number::<u32>("WEATHER_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(ms) = env_number::<u64>("WEATHER_RETRY_BACKOFF_MS")? {
            config.retry_backoff = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => parse_number(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

/// Parses into the target width directly, so an oversized value is an error
/// rather than a silent truncation.
fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        anyhow!(
            "{name} must be a non-negative integer that fits in {}, got '{raw}'",
            std::any::type_name::<T>()
        )
    })
}
