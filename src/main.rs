//! CLI entry point for the trip auditor.
//!
//! Provides subcommands for auditing a month of trip records, warming the
//! hourly weather cache, and running the full audit-and-enrich pipeline.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use trip_auditor::{
    config::{ReportingPeriod, ValidationConfig, WeatherConfig},
    flags::FlagEngine,
    output::{log_summary, print_json, write_audit, write_clean, write_summary},
    pipeline,
    record::{TripRecord, load_trips},
    upload::{upload_artifacts, write_json_to_s3},
    weather::{TimelineClient, WeatherCache},
    zones::ZoneRegistry,
};

#[derive(Parser)]
#[command(name = "trip_auditor")]
#[command(about = "Audit, correct and weather-enrich a month of taxi trips", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PeriodArgs {
    /// Reporting year
    #[arg(long)]
    year: i32,

    /// Reporting month (1-12)
    #[arg(long)]
    month: u32,
}

#[derive(Args)]
struct AuditArgs {
    /// Trip records CSV
    #[arg(long)]
    trips: String,

    /// Zone lookup table CSV
    #[arg(long, default_value = "taxi_zone_lookup.csv")]
    zones: String,

    /// Optional JSON file overriding validation thresholds
    #[arg(long)]
    rules_config: Option<String>,

    /// Number of blocking workers for rule evaluation
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Audit artifact: every record with every flag
    #[arg(long, default_value = "audit.csv")]
    audit_out: String,

    /// Summary JSON
    #[arg(long, default_value = "summary.json")]
    summary_out: String,

    /// Also log the full summary as pretty JSON
    #[arg(long, default_value_t = false)]
    print_summary: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Flag every record and write the audit artifact
    Validate {
        #[command(flatten)]
        period: PeriodArgs,

        #[command(flatten)]
        audit: AuditArgs,
    },
    /// Fill the weather cache for a month without touching trips
    FetchWeather {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Validate, fetch weather, and write audit and clean artifacts
    Run {
        #[command(flatten)]
        period: PeriodArgs,

        #[command(flatten)]
        audit: AuditArgs,

        /// Clean artifact: valid records joined to weather
        #[arg(long, default_value = "clean.csv")]
        clean_out: String,

        /// Optional: S3 bucket name to upload artifacts to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress artifacts before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trip_auditor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trip_auditor.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { period, audit } => {
            let period = ReportingPeriod::new(period.year, period.month)?;
            let (engine, trips) = prepare(period, &audit)?;

            let evaluation = engine.evaluate_concurrent(trips, audit.workers).await?;
            let summary = evaluation.summary().with_period(period);

            write_audit(&audit.audit_out, &evaluation)?;
            write_summary(&audit.summary_out, &summary)?;
            log_summary(&summary);
            if audit.print_summary {
                print_json(&summary)?;
            }
        }
        Commands::FetchWeather { period } => {
            let period = ReportingPeriod::new(period.year, period.month)?;
            let weather = WeatherConfig::from_env()?;
            let mut cache = WeatherCache::open(&weather.cache_dir, period)?;
            fill_cache(&mut cache, &weather).await?;
        }
        Commands::Run {
            period,
            audit,
            clean_out,
            s3_bucket,
            gzip,
        } => {
            let period = ReportingPeriod::new(period.year, period.month)?;
            let weather = WeatherConfig::from_env()?;

            // structural errors surface here, before any rule or fetch runs
            let (engine, trips) = prepare(period, &audit)?;
            let mut cache = WeatherCache::open(&weather.cache_dir, period)?;
            if let Err(e) = fill_cache(&mut cache, &weather).await {
                warn!(error = %e, "Weather fetch skipped, joining against cached hours only");
            }

            let out = pipeline::run_concurrent(engine, trips, &cache, audit.workers).await?;

            write_audit(&audit.audit_out, &out.evaluation)?;
            write_clean(&clean_out, &out.enriched)?;
            write_summary(&audit.summary_out, &out.summary)?;
            log_summary(&out.summary);
            if audit.print_summary {
                print_json(&out.summary)?;
            }

            if let Some(bucket) = s3_bucket {
                let config = aws_config::load_from_env().await;
                let s3 = aws_sdk_s3::Client::new(&config);
                info!(bucket = %bucket, gzip, "S3 upload enabled");
                upload_artifacts(
                    &s3,
                    &bucket,
                    &period.to_string(),
                    &[audit.audit_out.as_str(), clean_out.as_str()],
                    gzip,
                )
                .await?;
                write_json_to_s3(
                    &s3,
                    &bucket,
                    &format!("period={period}/summary.json"),
                    &out.summary,
                )
                .await?;
            }
        }
    }

    Ok(())
}

/// Loads configuration, the zone table and the trip file.
fn prepare(
    period: ReportingPeriod,
    audit: &AuditArgs,
) -> Result<(Arc<FlagEngine>, Arc<Vec<TripRecord>>)> {
    let mut config = match &audit.rules_config {
        Some(path) => ValidationConfig::from_json_file(path)?,
        None => ValidationConfig::default(),
    };
    config.period = period;

    let zones = ZoneRegistry::load(&audit.zones)?;
    let trips = load_trips(&audit.trips)?;
    info!(%period, records = trips.len(), zones = zones.len(), "Inputs loaded");

    let engine = FlagEngine::new(Arc::new(config), Arc::new(zones));
    Ok((Arc::new(engine), Arc::new(trips)))
}

/// Fetches whatever hours the cache lacks.
async fn fill_cache(cache: &mut WeatherCache, weather: &WeatherConfig) -> Result<()> {
    if cache.missing_hours().is_empty() {
        return Ok(());
    }

    let client = TimelineClient::from_config(weather)
        .context("weather cache incomplete and no client could be built")?;
    let summary = cache.ensure_period(&client, weather).await?;
    info!(
        fetched = summary.fetched,
        failed = summary.failed,
        calls = summary.external_calls,
        "Weather cache updated"
    );
    Ok(())
}
