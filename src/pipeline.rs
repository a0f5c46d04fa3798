//! records → correction → flags → valid/invalid split → weather join.

use crate::enrich::{EnrichedRecord, count_missing_weather, merge};
use crate::flags::{Evaluation, FlagEngine};
use crate::record::TripRecord;
use crate::stats::ValidationSummary;
use crate::weather::WeatherCache;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Everything one run produces.
#[derive(Debug)]
pub struct PipelineOutput {
    pub evaluation: Evaluation,
    pub enriched: Vec<EnrichedRecord>,
    pub summary: ValidationSummary,
}

fn finish(evaluation: Evaluation, cache: &WeatherCache) -> PipelineOutput {
    let enriched = merge(&evaluation.valid_records(), cache);
    let summary = evaluation
        .summary()
        .with_period(cache.period())
        .with_clean_artifact(enriched.len(), count_missing_weather(&enriched));

    if !summary.is_accounted() {
        warn!(
            invalid = summary.invalid_count,
            dropped = ?summary.dropped_count,
            "Dropped records do not match flagged records"
        );
    }

    PipelineOutput {
        evaluation,
        enriched,
        summary,
    }
}

/// Audits `trips` and joins the valid ones to `cache`.
pub fn run(engine: &FlagEngine, trips: &[TripRecord], cache: &WeatherCache) -> PipelineOutput {
    finish(engine.evaluate(trips), cache)
}

/// [`run`] with rule evaluation spread over `workers` blocking tasks.
pub async fn run_concurrent(
    engine: Arc<FlagEngine>,
    trips: Arc<Vec<TripRecord>>,
    cache: &WeatherCache,
    workers: usize,
) -> Result<PipelineOutput> {
    let evaluation = engine.evaluate_concurrent(trips, workers).await?;
    Ok(finish(evaluation, cache))
}
