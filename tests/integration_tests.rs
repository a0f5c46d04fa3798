use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use trip_auditor::config::{ReportingPeriod, ValidationConfig, WeatherConfig};
use trip_auditor::flags::{FlagEngine, Provenance};
use trip_auditor::output::{write_audit, write_clean, write_summary};
use trip_auditor::pipeline;
use trip_auditor::record::load_trips;
use trip_auditor::rules::Rule;
use trip_auditor::weather::{CacheState, HourlyObservation, Precipitation, WeatherApi, WeatherCache};
use trip_auditor::zones::ZoneRegistry;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trip_auditor_it_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn january() -> ReportingPeriod {
    ReportingPeriod::new(2025, 1).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

/// Cold mornings, mild afternoons, rain at 08:00, and one hour that never answers.
struct StubWeather {
    dead: (NaiveDate, u32),
    calls: AtomicUsize,
}

#[async_trait]
impl WeatherApi for StubWeather {
    async fn fetch_hour(&self, date: NaiveDate, hour: u32) -> Result<HourlyObservation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if (date, hour) == self.dead {
            bail!("503 Service Unavailable");
        }
        Ok(HourlyObservation {
            date,
            hour,
            temperature_c: Some(if hour < 12 { 5.0 } else { 12.0 }),
            wind_speed_kmh: Some(10.0),
            visibility_km: Some(16.0),
            precipitation: if hour == 8 {
                Precipitation::Rain
            } else {
                Precipitation::None
            },
        })
    }
}

fn weather_config(cache_dir: PathBuf) -> WeatherConfig {
    WeatherConfig {
        cache_dir,
        min_interval: Duration::ZERO,
        max_retries: 0,
        retry_backoff: Duration::ZERO,
        ..Default::default()
    }
}

fn engine() -> FlagEngine {
    let zones = ZoneRegistry::load(&fixture("taxi_zone_lookup.csv")).unwrap();
    FlagEngine::new(
        Arc::new(ValidationConfig::for_period(january())),
        Arc::new(zones),
    )
}

async fn warm_cache(name: &str) -> WeatherCache {
    let config = weather_config(scratch_dir(name));
    let api = StubWeather {
        dead: (date(6), 12),
        calls: AtomicUsize::new(0),
    };
    let mut cache = WeatherCache::open(&config.cache_dir, january()).unwrap();
    let summary = cache.ensure_period(&api, &config).await.unwrap();
    assert_eq!(summary.expected, 31 * 24);
    assert_eq!(summary.failed, 1);
    cache
}

#[test]
fn test_fixture_loads_every_row() {
    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    assert_eq!(trips.len(), 14);

    // the malformed row still counts, with its unreadable fields absent
    assert_eq!(trips[9].vendor_id, None);
    assert_eq!(trips[9].pickup_datetime, None);
}

#[test]
fn test_full_audit_flags_expected_records() {
    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    let evaluation = engine().evaluate(&trips);
    let rows = evaluation.records();

    assert_eq!(evaluation.original_count(), 14);
    assert_eq!(
        evaluation.valid_mask(),
        vec![
            true, true, true, false, true, false, false, true, true, false, false, true, false,
            true,
        ]
    );

    // reversed times are repaired and the repair is recorded
    assert!(rows[1].indicators.has_provenance(Provenance::SwappedDatetime));
    assert_eq!(
        rows[1].corrected.pickup_datetime,
        Some(ts("2025-01-06 08:10:00"))
    );
    assert_eq!(
        rows[1].original.pickup_datetime,
        Some(ts("2025-01-06 08:40:00"))
    );

    // flat-rate fare is exact
    assert!(!rows[2].indicators.is_invalid(Rule::FlatFare));
    assert!(rows[3].indicators.is_invalid(Rule::FlatFare));

    // no rush-hour surcharge on a holiday
    assert!(!rows[4].indicators.is_invalid(Rule::Extra));
    assert!(rows[5].indicators.is_invalid(Rule::Extra));

    // cash trips carry no tip
    assert!(rows[6].indicators.is_invalid(Rule::TipAmount));
    assert!(!rows[7].indicators.is_invalid(Rule::TipAmount));

    // passenger count is judged as loaded, then reset
    assert!(rows[10].indicators.is_invalid(Rule::PassengerCount));
    assert!(rows[10].indicators.has_provenance(Provenance::ResetPassengerCount));
    assert_eq!(rows[10].original.passenger_count, Some(0));
    assert_eq!(rows[10].corrected.passenger_count, Some(1));

    assert!(rows[12].indicators.is_invalid(Rule::Location));
}

#[test]
fn test_reports_keep_load_time_denominator() {
    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    let evaluation = engine().evaluate(&trips);

    let tips = evaluation.report("is_invalid_tip_amount").unwrap();
    assert_eq!(tips.count, 2);
    assert_eq!(tips.total, 14);

    let cash = evaluation
        .view()
        .filter(|r| r.original.payment_type == Some(2));
    assert_eq!(cash.len(), 2);
    let tips = cash.report("is_invalid_tip_amount").unwrap();
    assert_eq!(tips.count, 1);
    assert_eq!(tips.total, 14);

    assert!(evaluation.report("is_made_up").is_none());
}

#[tokio::test]
async fn test_run_joins_valid_records_to_weather() {
    let cache = warm_cache("run").await;
    assert_eq!(
        cache.state(),
        CacheState::Partial {
            cached: 743,
            expected: 744
        }
    );

    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    let out = pipeline::run(&engine(), &trips, &cache);

    assert_eq!(out.enriched.len(), 8);
    assert_eq!(out.summary.period.as_deref(), Some("2025-01"));
    assert_eq!(out.summary.original_count, 14);
    assert_eq!(out.summary.valid_count, 8);
    assert_eq!(out.summary.invalid_count, 6);
    assert_eq!(out.summary.clean_count, Some(8));
    assert_eq!(out.summary.dropped_count, Some(6));
    assert!(out.summary.is_accounted());

    // the dead hour and the December pickup have no observation
    assert_eq!(out.summary.missing_weather, Some(2));
    assert!(out.enriched[0].observation.is_none());
    assert_eq!(out.enriched[0].flags.is_cold, None);
    assert!(out.enriched[6].observation.is_none());

    // corrected pickup hour drives the join
    let swapped = &out.enriched[1];
    assert_eq!(
        swapped.observation.as_ref().map(|o| o.key()),
        Some((date(6), 8))
    );
    assert_eq!(swapped.flags.is_rainy_snowy, Some(true));
    assert_eq!(swapped.flags.is_cold, Some(true));
    assert_eq!(swapped.flags.is_taxi_favorable, Some(true));

    let afternoon = &out.enriched[2];
    assert_eq!(afternoon.flags.is_cold, Some(false));
    assert_eq!(afternoon.flags.is_rainy_snowy, Some(false));
    assert_eq!(afternoon.flags.is_taxi_favorable, Some(false));
}

#[tokio::test]
async fn test_second_fetch_only_retries_missing_hour() {
    let dir = scratch_dir("resume");
    let config = weather_config(dir.clone());

    let first = StubWeather {
        dead: (date(31), 23),
        calls: AtomicUsize::new(0),
    };
    let mut cache = WeatherCache::open(&dir, january()).unwrap();
    cache.ensure_period(&first, &config).await.unwrap();
    assert_eq!(first.calls.load(Ordering::SeqCst), 744);

    // a new process reopens the file and asks only for what is absent
    let second = StubWeather {
        dead: (date(1), 0),
        calls: AtomicUsize::new(0),
    };
    let mut cache = WeatherCache::open(&dir, january()).unwrap();
    assert_eq!(cache.missing_hours(), vec![(date(31), 23)]);
    let summary = cache.ensure_period(&second, &config).await.unwrap();
    assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.fetched, 1);
    assert_eq!(cache.state(), CacheState::Warm);

    let third = StubWeather {
        dead: (date(1), 0),
        calls: AtomicUsize::new(0),
    };
    let summary = cache.ensure_period(&third, &config).await.unwrap();
    assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.external_calls, 0);
}

#[tokio::test]
async fn test_concurrent_run_matches_sequential() {
    let cache = warm_cache("concurrent").await;
    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    let engine = engine();

    let sequential = pipeline::run(&engine, &trips, &cache);
    let concurrent = pipeline::run_concurrent(Arc::new(engine), Arc::new(trips), &cache, 3)
        .await
        .unwrap();

    assert_eq!(
        sequential.evaluation.records(),
        concurrent.evaluation.records()
    );
    assert_eq!(sequential.enriched, concurrent.enriched);
}

#[tokio::test]
async fn test_artifacts_written() {
    let cache = warm_cache("artifacts").await;
    let trips = load_trips(&fixture("trips_2025_01.csv")).unwrap();
    let out = pipeline::run(&engine(), &trips, &cache);

    let dir = scratch_dir("artifacts_out");
    let audit = dir.join("audit.csv").display().to_string();
    let clean = dir.join("clean.csv").display().to_string();
    let summary = dir.join("summary.json").display().to_string();

    write_audit(&audit, &out.evaluation).unwrap();
    write_clean(&clean, &out.enriched).unwrap();
    write_summary(&summary, &out.summary).unwrap();

    let mut rdr = csv::Reader::from_path(&audit).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(headers.iter().last(), Some("is_valid_record"));
    assert_eq!(rdr.records().count(), 14);

    let mut rdr = csv::Reader::from_path(&clean).unwrap();
    assert!(rdr.headers().unwrap().iter().any(|h| h == "is_taxi_favorable"));
    assert_eq!(rdr.records().count(), 8);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["original_count"], 14);
    assert_eq!(json["valid_count"], 8);
}
