//! Persisted per-month store of hourly observations.
//!
//! One CSV per (year, month). Rows are appended as each hour arrives, so an
//! interrupted fetch leaves a valid partial file that the next run extends.

use super::api::WeatherApi;
use super::scheduler::RateLimiter;
use super::types::HourlyObservation;
use crate::config::{ReportingPeriod, WeatherConfig};
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column order of a cache file, as written by [`WeatherCache::record`].
const CACHE_COLUMNS: [&str; 6] = [
    "date",
    "hour",
    "temperature_c",
    "wind_speed_kmh",
    "visibility_km",
    "precipitation",
];

/// How complete the cache is for its period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Cold,
    Partial { cached: usize, expected: usize },
    Warm,
}

/// Outcome of [`WeatherCache::ensure_period`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub expected: usize,
    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
    pub external_calls: u64,
}

#[derive(Debug, Clone)]
pub struct WeatherCache {
    path: PathBuf,
    period: ReportingPeriod,
    observations: BTreeMap<(NaiveDate, u32), HourlyObservation>,
}

impl WeatherCache {
    pub fn file_name(period: ReportingPeriod) -> String {
        format!("weather_{:04}_{:02}.csv", period.year, period.month)
    }

    /// Opens the cache for `period` under `dir`, loading whatever is on disk.
    ///
    /// # Errors
    ///
    /// Fails if an existing cache file cannot be read or its header is not a
    /// cache header. Rows that do not parse are skipped and their hours count
    /// as missing.
    #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display(), period = %period))]
    pub fn open(dir: impl AsRef<Path>, period: ReportingPeriod) -> Result<Self> {
        let path = dir.as_ref().join(Self::file_name(period));
        let mut cache = Self {
            path,
            period,
            observations: BTreeMap::new(),
        };

        if cache.path.exists() {
            let file = File::open(&cache.path)
                .with_context(|| format!("failed to open weather cache {}", cache.path.display()))?;
            let mut rdr = csv::Reader::from_reader(file);

            let headers = rdr
                .headers()
                .with_context(|| format!("failed to read weather cache {}", cache.path.display()))?;
            if !headers.is_empty() && headers.iter().ne(CACHE_COLUMNS.iter().copied()) {
                bail!(
                    "weather cache {} has unexpected header: {}",
                    cache.path.display(),
                    headers.iter().collect::<Vec<_>>().join(",")
                );
            }

            for (line, row) in rdr.deserialize::<HourlyObservation>().enumerate() {
                match row {
                    Ok(obs) if period.contains(obs.date) && obs.hour < 24 => {
                        // last row wins, so one observation per key
                        cache.observations.insert(obs.key(), obs);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // an interrupted append leaves a torn last row; its hour stays missing
                        warn!(
                            path = %cache.path.display(),
                            line = line + 2,
                            error = %e,
                            "Unreadable weather cache row skipped"
                        );
                    }
                }
            }
        }

        info!(
            path = %cache.path.display(),
            cached = cache.len(),
            state = ?cache.state(),
            "Weather cache opened"
        );
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn period(&self) -> ReportingPeriod {
        self.period
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn state(&self) -> CacheState {
        let expected = self.period.hours().len();
        match self.observations.len() {
            0 => CacheState::Cold,
            n if n >= expected => CacheState::Warm,
            cached => CacheState::Partial { cached, expected },
        }
    }

    pub fn observation(&self, date: NaiveDate, hour: u32) -> Option<&HourlyObservation> {
        self.observations.get(&(date, hour))
    }

    pub fn observations(&self) -> impl Iterator<Item = &HourlyObservation> {
        self.observations.values()
    }

    /// Hours of the period with no stored observation, in order.
    pub fn missing_hours(&self) -> Vec<(NaiveDate, u32)> {
        self.period
            .hours()
            .into_iter()
            .filter(|key| !self.observations.contains_key(key))
            .collect()
    }

    /// Persists one observation and makes it readable.
    pub fn record(&mut self, obs: HourlyObservation) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let has_rows = self.path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .with_context(|| format!("failed to open weather cache {}", self.path.display()))?;

        // start a fresh line after a torn row
        if has_rows && ends_mid_row(&self.path)? {
            file.write_all(b"\n")?;
        }

        let mut writer = WriterBuilder::new().has_headers(!has_rows).from_writer(file);
        writer.serialize(&obs)?;
        writer.flush()?;

        self.observations.insert(obs.key(), obs);
        Ok(())
    }

    /// Fetches every missing hour of the period, one call at a time.
    ///
    /// A warm cache makes no external calls. A failed hour is retried up to
    /// `max_retries` times, then left absent; neighbours already fetched are
    /// kept and a later run picks up only what is still missing.
    #[tracing::instrument(skip_all, fields(period = %self.period))]
    pub async fn ensure_period<A: WeatherApi + ?Sized>(
        &mut self,
        api: &A,
        config: &WeatherConfig,
    ) -> Result<FetchSummary> {
        let missing = self.missing_hours();
        let mut summary = FetchSummary {
            expected: self.period.hours().len(),
            cached: self.len(),
            ..Default::default()
        };

        if missing.is_empty() {
            info!(cached = summary.cached, "Weather cache warm, no fetch needed");
            return Ok(summary);
        }

        info!(
            missing = missing.len(),
            cached = summary.cached,
            min_interval_ms = config.min_interval.as_millis() as u64,
            "Fetching missing weather hours"
        );

        let mut limiter = RateLimiter::new(config.min_interval);
        for (date, hour) in missing {
            match fetch_with_retry(api, &mut limiter, config, date, hour).await {
                Ok(mut obs) => {
                    obs.date = date;
                    obs.hour = hour;
                    self.record(obs)?;
                    summary.fetched += 1;
                    debug!(%date, hour, "Weather hour cached");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(%date, hour, error = %e, "Weather hour unavailable, leaving absent");
                }
            }
        }
        summary.external_calls = limiter.calls();

        info!(
            fetched = summary.fetched,
            failed = summary.failed,
            calls = summary.external_calls,
            state = ?self.state(),
            "Weather fetch finished"
        );
        Ok(summary)
    }
}

/// True if the file's last byte is not a newline.
fn ends_mid_row(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    if file.seek(SeekFrom::End(0))? == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

async fn fetch_with_retry<A: WeatherApi + ?Sized>(
    api: &A,
    limiter: &mut RateLimiter,
    config: &WeatherConfig,
    date: NaiveDate,
    hour: u32,
) -> Result<HourlyObservation> {
    let mut backoff = config.retry_backoff;
    let mut attempt = 0;
    loop {
        limiter.acquire().await;
        match api.fetch_hour(date, hour).await {
            Ok(obs) => return Ok(obs),
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                debug!(%date, hour, attempt, error = %e, "Weather fetch failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::types::Precipitation;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Counts calls; fails the listed hours a set number of times each.
    struct FakeApi {
        calls: AtomicU64,
        flaky: Mutex<BTreeMap<(NaiveDate, u32), u32>>,
        dead: HashSet<(NaiveDate, u32)>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
                flaky: Mutex::new(BTreeMap::new()),
                dead: HashSet::new(),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherApi for FakeApi {
        async fn fetch_hour(&self, date: NaiveDate, hour: u32) -> Result<HourlyObservation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.dead.contains(&(date, hour)) {
                anyhow::bail!("upstream 503");
            }
            if let Some(left) = self.flaky.lock().unwrap().get_mut(&(date, hour)) {
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("timeout");
                }
            }
            Ok(HourlyObservation::from_us_units(
                date,
                hour,
                Some(32.0 + hour as f64),
                Some(10.0),
                Some(10.0),
                Precipitation::None,
            ))
        }
    }

    fn fast_config() -> WeatherConfig {
        WeatherConfig {
            min_interval: Duration::ZERO,
            retry_backoff: Duration::ZERO,
            max_retries: 2,
            ..Default::default()
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trip_auditor_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn feb() -> ReportingPeriod {
        ReportingPeriod::new(2023, 2).unwrap()
    }

    #[tokio::test]
    async fn test_cold_cache_fetches_every_hour() {
        let dir = temp_dir("cache_cold");
        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(cache.state(), CacheState::Cold);

        let api = FakeApi::new();
        let summary = cache.ensure_period(&api, &fast_config()).await.unwrap();

        assert_eq!(summary.expected, 28 * 24);
        assert_eq!(summary.fetched, 28 * 24);
        assert_eq!(api.calls(), 28 * 24);
        assert_eq!(cache.state(), CacheState::Warm);
        assert!(cache.path().exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_warm_cache_makes_no_calls() {
        let dir = temp_dir("cache_warm");
        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        cache.ensure_period(&FakeApi::new(), &fast_config()).await.unwrap();
        let before: Vec<_> = cache.observations().cloned().collect();

        // same process and a fresh open both serve from the store
        let api = FakeApi::new();
        let summary = cache.ensure_period(&api, &fast_config()).await.unwrap();
        assert_eq!(api.calls(), 0);
        assert_eq!(summary.fetched, 0);

        let mut reopened = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(reopened.state(), CacheState::Warm);
        reopened.ensure_period(&api, &fast_config()).await.unwrap();
        assert_eq!(api.calls(), 0);

        let after: Vec<_> = reopened.observations().cloned().collect();
        assert_eq!(before, after);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_hour_is_left_absent_and_resumed() {
        let dir = temp_dir("cache_partial");
        let day = NaiveDate::from_ymd_opt(2023, 2, 10).unwrap();

        let mut api = FakeApi::new();
        api.dead.insert((day, 5));
        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        let summary = cache.ensure_period(&api, &fast_config()).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fetched, 28 * 24 - 1);
        // one call plus two retries for the dead hour
        assert_eq!(api.calls(), 28 * 24 + 2);
        assert!(cache.observation(day, 5).is_none());
        assert!(cache.observation(day, 4).is_some());
        assert!(matches!(cache.state(), CacheState::Partial { .. }));

        let api = FakeApi::new();
        let mut reopened = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(reopened.missing_hours(), vec![(day, 5)]);
        let summary = reopened.ensure_period(&api, &fast_config()).await.unwrap();
        assert_eq!(api.calls(), 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(reopened.state(), CacheState::Warm);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_flaky_hour_is_retried() {
        let dir = temp_dir("cache_flaky");
        let day = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();

        let api = FakeApi::new();
        api.flaky.lock().unwrap().insert((day, 0), 2);
        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        let summary = cache.ensure_period(&api, &fast_config()).await.unwrap();

        assert_eq!(summary.failed, 0);
        assert!(cache.observation(day, 0).is_some());
        assert_eq!(summary.external_calls, 28 * 24 + 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_record_round_trips_through_disk() {
        let dir = temp_dir("cache_record");
        let day = NaiveDate::from_ymd_opt(2023, 2, 3).unwrap();
        let obs = HourlyObservation {
            date: day,
            hour: 9,
            temperature_c: Some(-2.5),
            wind_speed_kmh: None,
            visibility_km: Some(1.2),
            precipitation: Precipitation::Snow,
        };

        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        cache.record(obs.clone()).unwrap();

        let reopened = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(reopened.observation(day, 9), Some(&obs));
        assert_eq!(
            reopened.state(),
            CacheState::Partial {
                cached: 1,
                expected: 28 * 24
            }
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_torn_last_row_is_refetched() {
        let dir = temp_dir("cache_torn");
        let day = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();

        let mut cache = WeatherCache::open(&dir, feb()).unwrap();
        cache
            .record(HourlyObservation::from_us_units(
                day,
                0,
                Some(32.0),
                Some(10.0),
                Some(10.0),
                Precipitation::None,
            ))
            .unwrap();
        // interrupted mid-row: no trailing newline, fields missing
        let mut file = OpenOptions::new().append(true).open(cache.path()).unwrap();
        file.write_all(b"2023-02-01,1,1.0,2").unwrap();
        drop(file);

        let mut reopened = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.missing_hours().contains(&(day, 1)));
        assert!(matches!(reopened.state(), CacheState::Partial { .. }));

        let api = FakeApi::new();
        let summary = reopened.ensure_period(&api, &fast_config()).await.unwrap();
        assert_eq!(summary.fetched, 28 * 24 - 1);
        assert_eq!(reopened.state(), CacheState::Warm);

        // the refetched hour landed on its own line
        let again = WeatherCache::open(&dir, feb()).unwrap();
        assert_eq!(again.state(), CacheState::Warm);
        assert!(again.observation(day, 1).is_some());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_foreign_header_is_load_error() {
        let dir = temp_dir("cache_header");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(WeatherCache::file_name(feb())),
            "VendorID,total_amount\n2,21.2\n",
        )
        .unwrap();

        let err = WeatherCache::open(&dir, feb()).unwrap_err();
        assert!(err.to_string().contains("unexpected header"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_name_per_month() {
        assert_eq!(WeatherCache::file_name(feb()), "weather_2023_02.csv");
    }
}
