use chrono::{DateTime, Utc};
use serde::Serialize;

/// How often one indicator was raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagReport {
    pub flag: String,
    pub count: usize,
    /// Load-time record count, the fixed denominator.
    pub total: usize,
    pub percentage: f64,
}

impl FlagReport {
    pub fn new(flag: &str, count: usize, total: usize) -> Self {
        Self {
            flag: flag.to_string(),
            count,
            total,
            percentage: pct(count, total),
        }
    }
}

pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Run-level audit summary written alongside the artifacts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSummary {
    pub generated_at: DateTime<Utc>,
    pub period: Option<String>,
    pub original_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub valid_pct: f64,

    // clean artifact
    pub clean_count: Option<usize>,
    pub dropped_count: Option<usize>,
    pub missing_weather: Option<usize>,

    pub flags: Vec<FlagReport>,
}

impl ValidationSummary {
    pub fn new(original_count: usize, valid_count: usize, flags: Vec<FlagReport>) -> Self {
        ValidationSummary {
            generated_at: Utc::now(),
            original_count,
            valid_count,
            invalid_count: original_count - valid_count,
            valid_pct: pct(valid_count, original_count),
            flags,
            ..Default::default()
        }
    }

    pub fn with_period(mut self, period: impl ToString) -> Self {
        self.period = Some(period.to_string());
        self
    }

    /// Records what made it into the clean artifact.
    pub fn with_clean_artifact(mut self, clean_count: usize, missing_weather: usize) -> Self {
        self.clean_count = Some(clean_count);
        self.dropped_count = Some(self.original_count.saturating_sub(clean_count));
        self.missing_weather = Some(missing_weather);
        self
    }

    /// Every dropped record is one that some rule flagged.
    pub fn is_accounted(&self) -> bool {
        self.dropped_count
            .is_none_or(|dropped| dropped == self.invalid_count)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagReport> {
        self.flags.iter().find(|f| f.flag == name)
    }
}
