//! The external hourly weather endpoint.

use super::types::{HourlyObservation, Precipitation};
use crate::config::WeatherConfig;
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Source of one observation per call.
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn fetch_hour(&self, date: NaiveDate, hour: u32) -> Result<HourlyObservation>;
}

#[derive(Debug, Deserialize)]
struct TimelineResponse {
    #[serde(rename = "currentConditions")]
    current_conditions: Option<Conditions>,
}

#[derive(Debug, Deserialize)]
struct Conditions {
    temp: Option<f64>,
    windspeed: Option<f64>,
    visibility: Option<f64>,
    preciptype: Option<Vec<String>>,
}

/// Timeline-style client: one request per hour, readings in US units.
pub struct TimelineClient<C> {
    http: C,
    base_url: reqwest::Url,
    location: String,
}

impl TimelineClient<UrlParam<BasicClient>> {
    /// Builds a keyed client from configuration.
    ///
    /// # Errors
    ///
    /// Fails if no API key is configured or the base URL does not parse.
    pub fn from_config(config: &WeatherConfig) -> Result<Self> {
        let key = config
            .api_key
            .as_deref()
            .context("WEATHER_API_KEY must be set to fetch weather")?;
        let http = UrlParam::new(BasicClient::new(Duration::from_secs(30))?, "key", key);
        Self::new(http, &config.base_url, &config.location)
    }
}

impl<C: HttpClient> TimelineClient<C> {
    pub fn new(http: C, base_url: &str, location: &str) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .with_context(|| format!("invalid weather base url '{base_url}'"))?;
        Ok(Self {
            http,
            base_url,
            location: location.to_string(),
        })
    }

    /// `{base}/{location}/{date}T{HH}:00:00?unitGroup=us&include=current`
    pub fn hour_url(&self, date: NaiveDate, hour: u32) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("weather base url cannot have path segments"))?
            .pop_if_empty()
            .push(&self.location)
            .push(&format!("{}T{:02}:00:00", date.format("%Y-%m-%d"), hour));
        url.query_pairs_mut()
            .append_pair("unitGroup", "us")
            .append_pair("include", "current");
        Ok(url)
    }
}

#[async_trait]
impl<C: HttpClient> WeatherApi for TimelineClient<C> {
    async fn fetch_hour(&self, date: NaiveDate, hour: u32) -> Result<HourlyObservation> {
        let url = self.hour_url(date, hour)?;
        let response: TimelineResponse = fetch_json(&self.http, url).await?;
        let current = response
            .current_conditions
            .context("response has no currentConditions")?;

        let precipitation = current
            .preciptype
            .as_deref()
            .map(Precipitation::from_types)
            .unwrap_or_default();

        Ok(HourlyObservation::from_us_units(
            date,
            hour,
            current.temp,
            current.windspeed,
            current.visibility,
            precipitation,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoHttp;

    #[async_trait]
    impl HttpClient for NoHttp {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            unreachable!("url tests never send")
        }
    }

    #[test]
    fn test_hour_url_encodes_location() {
        let client = TimelineClient::new(NoHttp, "https://example.com/rest/timeline/", "New York,NY")
            .unwrap();
        let url = client
            .hour_url(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(), 7)
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://example.com/rest/timeline/New%20York,NY/2025-01-06T07:00:00?unitGroup=us&include=current"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = WeatherConfig::default();
        assert!(TimelineClient::from_config(&config).is_err());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"currentConditions": {"temp": 41.0, "windspeed": 12.4, "visibility": 9.9, "preciptype": ["rain"], "conditions": "Rain"}}"#;
        let parsed: TimelineResponse = serde_json::from_str(body).unwrap();
        let current = parsed.current_conditions.unwrap();
        assert_eq!(current.temp, Some(41.0));
        assert_eq!(current.preciptype, Some(vec!["rain".to_string()]));

        let empty: TimelineResponse =
            serde_json::from_str(r#"{"currentConditions": {"preciptype": null}}"#).unwrap();
        assert!(empty.current_conditions.unwrap().temp.is_none());
    }
}
