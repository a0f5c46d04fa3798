//! Left join of valid trips onto hourly weather, plus derived weather flags.

use crate::record::TripRecord;
use crate::weather::{HourlyObservation, Precipitation, WeatherCache};
use serde::Serialize;
use tracing::info;

pub const FREEZING_MAX_C: f64 = 0.0;
pub const COLD_BELOW_C: f64 = 10.0;
pub const HOT_FROM_C: f64 = 30.0;
pub const WINDY_FROM_KMH: f64 = 30.0;
pub const POOR_VISIBILITY_BELOW_KM: f64 = 2.0;

/// Categorical flags over one observation. A flag is `None` when the value
/// it depends on is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeatherFlags {
    pub is_freezing: Option<bool>,
    pub is_cold: Option<bool>,
    pub is_hot: Option<bool>,
    pub is_windy: Option<bool>,
    pub is_poor_visibility: Option<bool>,
    pub is_rainy_snowy: Option<bool>,
    pub is_taxi_favorable: Option<bool>,
}

impl WeatherFlags {
    pub const NAMES: [&'static str; 7] = [
        "is_freezing",
        "is_cold",
        "is_hot",
        "is_windy",
        "is_poor_visibility",
        "is_rainy_snowy",
        "is_taxi_favorable",
    ];

    pub fn derive(obs: Option<&HourlyObservation>) -> Self {
        let Some(obs) = obs else {
            return Self::default();
        };
        let temp = obs.temperature_c;

        let is_cold = temp.map(|t| t < COLD_BELOW_C);
        let is_hot = temp.map(|t| t >= HOT_FROM_C);
        let is_rainy_snowy = Some(obs.precipitation != Precipitation::None);

        // rain, snow, cold or heat push riders into cabs
        let drivers = [is_rainy_snowy, is_cold, is_hot];
        let is_taxi_favorable = if drivers.contains(&Some(true)) {
            Some(true)
        } else if drivers.iter().all(Option::is_some) {
            Some(false)
        } else {
            None
        };

        Self {
            is_freezing: temp.map(|t| t <= FREEZING_MAX_C),
            is_cold,
            is_hot,
            is_windy: obs.wind_speed_kmh.map(|w| w >= WINDY_FROM_KMH),
            is_poor_visibility: obs.visibility_km.map(|v| v < POOR_VISIBILITY_BELOW_KM),
            is_rainy_snowy,
            is_taxi_favorable,
        }
    }

    /// Values in [`WeatherFlags::NAMES`] order.
    pub fn values(&self) -> [Option<bool>; 7] {
        [
            self.is_freezing,
            self.is_cold,
            self.is_hot,
            self.is_windy,
            self.is_poor_visibility,
            self.is_rainy_snowy,
            self.is_taxi_favorable,
        ]
    }
}

/// A valid trip with the weather at its pickup hour.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub trip: TripRecord,
    pub observation: Option<HourlyObservation>,
    pub flags: WeatherFlags,
}

/// Joins every trip to the observation for its pickup (date, hour).
///
/// Output has exactly one row per input trip, in input order. Trips with no
/// matching observation keep absent weather fields.
#[tracing::instrument(skip_all, fields(trips = trips.len(), cached = cache.len()))]
pub fn merge(trips: &[TripRecord], cache: &WeatherCache) -> Vec<EnrichedRecord> {
    let enriched: Vec<EnrichedRecord> = trips
        .iter()
        .map(|trip| {
            let observation = trip
                .pickup_hour_key()
                .and_then(|(date, hour)| cache.observation(date, hour))
                .cloned();
            EnrichedRecord {
                trip: trip.clone(),
                flags: WeatherFlags::derive(observation.as_ref()),
                observation,
            }
        })
        .collect();

    info!(
        enriched = enriched.len(),
        missing_weather = count_missing_weather(&enriched),
        "Weather join complete"
    );
    enriched
}

pub fn count_missing_weather(records: &[EnrichedRecord]) -> usize {
    records.iter().filter(|r| r.observation.is_none()).count()
}
