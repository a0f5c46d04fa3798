//! Flag engine: correction, every rule, and the composite verdict.
//!
//! Evidence is append-only. Each record carries an [`IndicatorSet`] that can
//! only gain raised flags; the validity verdict is derived from it on demand
//! and never stored separately.

use crate::config::ValidationConfig;
use crate::correction::correct;
use crate::record::TripRecord;
use crate::rules::{Rule, RuleContext, is_invalid};
use crate::stats::{FlagReport, ValidationSummary};
use crate::zones::ZoneRegistry;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const VALID_FLAG: &str = "is_valid_record";

/// Records that an automatic correction changed a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Provenance {
    SwappedDatetime,
    ResetPassengerCount,
}

impl Provenance {
    pub const ALL: [Provenance; 2] = [Provenance::SwappedDatetime, Provenance::ResetPassengerCount];

    pub fn flag_name(&self) -> &'static str {
        match self {
            Provenance::SwappedDatetime => "is_swapped_datetime",
            Provenance::ResetPassengerCount => "is_reset_passenger_count",
        }
    }
}

/// Every indicator column, in output order: validity rules, then provenance.
pub fn flag_names() -> Vec<&'static str> {
    Rule::ALL
        .iter()
        .map(Rule::flag_name)
        .chain(Provenance::ALL.iter().map(Provenance::flag_name))
        .collect()
}

pub fn is_flag_name(flag: &str) -> bool {
    flag == VALID_FLAG || flag_names().contains(&flag)
}

/// Named boolean indicators for one record. Flags can be raised, never cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    invalid: BTreeMap<Rule, bool>,
    provenance: BTreeMap<Provenance, bool>,
}

impl IndicatorSet {
    pub fn record_rule(&mut self, rule: Rule, invalid: bool) {
        *self.invalid.entry(rule).or_insert(false) |= invalid;
    }

    pub fn record_provenance(&mut self, kind: Provenance, applied: bool) {
        *self.provenance.entry(kind).or_insert(false) |= applied;
    }

    pub fn is_invalid(&self, rule: Rule) -> bool {
        self.invalid.get(&rule).copied().unwrap_or(false)
    }

    pub fn has_provenance(&self, kind: Provenance) -> bool {
        self.provenance.get(&kind).copied().unwrap_or(false)
    }

    /// `NOT (OR over every is_invalid_* flag)`.
    pub fn is_valid_record(&self) -> bool {
        !self.invalid.values().any(|v| *v)
    }

    /// Looks up any indicator by column name, including [`VALID_FLAG`].
    pub fn get(&self, flag: &str) -> Option<bool> {
        if flag == VALID_FLAG {
            return Some(self.is_valid_record());
        }
        if let Some(rule) = Rule::ALL.iter().find(|r| r.flag_name() == flag) {
            return Some(self.is_invalid(*rule));
        }
        Provenance::ALL
            .iter()
            .find(|p| p.flag_name() == flag)
            .map(|p| self.has_provenance(*p))
    }

    /// Values in [`flag_names`] order.
    pub fn values(&self) -> Vec<bool> {
        Rule::ALL
            .iter()
            .map(|r| self.is_invalid(*r))
            .chain(Provenance::ALL.iter().map(|p| self.has_provenance(*p)))
            .collect()
    }
}

/// A record as loaded, its corrected copy, and the evidence gathered on it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditedRecord {
    pub original: TripRecord,
    pub corrected: TripRecord,
    pub indicators: IndicatorSet,
}

impl AuditedRecord {
    pub fn is_valid(&self) -> bool {
        self.indicators.is_valid_record()
    }
}

/// Result of one pass over the full record set.
///
/// The load-time count is captured here and is the denominator of every
/// percentage, however the records are filtered afterwards.
#[derive(Debug, Clone)]
pub struct Evaluation {
    original_count: usize,
    records: Vec<AuditedRecord>,
}

impl Evaluation {
    pub fn original_count(&self) -> usize {
        self.original_count
    }

    pub fn records(&self) -> &[AuditedRecord] {
        &self.records
    }

    pub fn valid_mask(&self) -> Vec<bool> {
        self.records.iter().map(AuditedRecord::is_valid).collect()
    }

    /// Corrected copies of the records that passed every rule, in input order.
    pub fn valid_records(&self) -> Vec<TripRecord> {
        self.records
            .iter()
            .filter(|r| r.is_valid())
            .map(|r| r.corrected.clone())
            .collect()
    }

    /// A view over every record, for further filtering.
    pub fn view(&self) -> FilteredView<'_> {
        FilteredView {
            original_count: self.original_count,
            rows: self.records.iter().collect(),
        }
    }

    /// Count and percentage of records with `flag` raised.
    pub fn report(&self, flag: &str) -> Option<FlagReport> {
        self.view().report(flag)
    }

    pub fn summary(&self) -> ValidationSummary {
        let flags = flag_names()
            .into_iter()
            .filter_map(|name| self.report(name))
            .collect();
        let valid_count = self.records.iter().filter(|r| r.is_valid()).count();
        ValidationSummary::new(self.original_count, valid_count, flags)
    }
}

/// A filtered subset of an [`Evaluation`] that still reports against the
/// load-time count.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    original_count: usize,
    rows: Vec<&'a AuditedRecord>,
}

impl<'a> FilteredView<'a> {
    pub fn filter(self, keep: impl Fn(&AuditedRecord) -> bool) -> Self {
        Self {
            original_count: self.original_count,
            rows: self.rows.into_iter().filter(|r| keep(r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[&'a AuditedRecord] {
        &self.rows
    }

    /// `None` if `flag` is not an indicator name.
    pub fn report(&self, flag: &str) -> Option<FlagReport> {
        if !is_flag_name(flag) {
            return None;
        }
        let count = self
            .rows
            .iter()
            .filter(|r| r.indicators.get(flag) == Some(true))
            .count();
        Some(FlagReport::new(flag, count, self.original_count))
    }
}

/// Runs correction and the rule catalog over records.
#[derive(Debug, Clone)]
pub struct FlagEngine {
    config: Arc<ValidationConfig>,
    zones: Arc<ZoneRegistry>,
}

impl FlagEngine {
    pub fn new(config: Arc<ValidationConfig>, zones: Arc<ZoneRegistry>) -> Self {
        Self { config, zones }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Corrects one record, then runs every rule on it.
    pub fn audit(&self, record: &TripRecord) -> AuditedRecord {
        let fixed = correct(record, &self.config);

        let mut indicators = IndicatorSet::default();
        indicators.record_provenance(Provenance::SwappedDatetime, fixed.swapped_datetime);
        indicators.record_provenance(
            Provenance::ResetPassengerCount,
            fixed.reset_passenger_count,
        );

        let ctx = RuleContext::for_record(&self.config, &self.zones, &fixed.record);
        for rule in Rule::ALL {
            let subject = if rule.reads_original() {
                record
            } else {
                &fixed.record
            };
            indicators.record_rule(rule, is_invalid(rule, subject, &ctx));
        }

        AuditedRecord {
            original: record.clone(),
            corrected: fixed.record,
            indicators,
        }
    }

    /// Audits every record in order.
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub fn evaluate(&self, records: &[TripRecord]) -> Evaluation {
        let audited: Vec<AuditedRecord> = records.iter().map(|r| self.audit(r)).collect();
        let evaluation = Evaluation {
            original_count: records.len(),
            records: audited,
        };
        log_outcome(&evaluation);
        evaluation
    }

    /// Same result as [`FlagEngine::evaluate`], split across blocking workers.
    #[tracing::instrument(skip_all, fields(records = records.len(), workers))]
    pub async fn evaluate_concurrent(
        self: Arc<Self>,
        records: Arc<Vec<TripRecord>>,
        workers: usize,
    ) -> Result<Evaluation> {
        let workers = workers.max(1);
        let chunk_size = records.len().div_ceil(workers).max(1);

        let mut tasks = Vec::new();
        for start in (0..records.len()).step_by(chunk_size) {
            let end = (start + chunk_size).min(records.len());
            let engine = self.clone();
            let records = records.clone();
            tasks.push(tokio::task::spawn_blocking(move || {
                records[start..end]
                    .iter()
                    .map(|r| engine.audit(r))
                    .collect::<Vec<_>>()
            }));
        }
        debug!(chunks = tasks.len(), chunk_size, "Evaluation chunks dispatched");

        // awaiting in spawn order keeps input order
        let mut audited = Vec::with_capacity(records.len());
        for task in tasks {
            audited.extend(task.await.context("evaluation worker failed")?);
        }

        let evaluation = Evaluation {
            original_count: records.len(),
            records: audited,
        };
        log_outcome(&evaluation);
        Ok(evaluation)
    }
}

fn log_outcome(evaluation: &Evaluation) {
    let valid = evaluation.records.iter().filter(|r| r.is_valid()).count();
    info!(
        original = evaluation.original_count,
        valid,
        invalid = evaluation.original_count - valid,
        "Flag evaluation complete"
    );
}
