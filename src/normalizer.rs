//! Log normalization
//!
//! This module is the single place that looks at the shape of a stored log:
//! - Both symptom encodings are reduced to [`NormalizedSymptoms`]
//! - Severities are coerced to numbers in 0-5
//! - Same-day logs are merged into one [`MergedDay`]
//! - Context tags are matched against the stressor vocabulary
//!
//! [`LogIngest`] reads log payloads (JSON array or NDJSON) into [`DailyLog`]s.

use crate::error::EngineError;
use crate::types::{
    keep_max, number_from_value, DailyLog, MergedDay, NormalizedSymptoms, SymptomEncoding,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Upper bound of the severity scale
pub const MAX_SEVERITY: f64 = 5.0;

/// Severity assumed when an entry is present but its value is not a number
pub const DEFAULT_PRESENT_SEVERITY: f64 = 1.0;

/// Context tags counted as stressors (matched lower-cased, exactly)
pub const STRESSOR_TAGS: &[&str] = &[
    "alcohol",
    "argument",
    "caffeine",
    "caregiving",
    "conflict",
    "deadline",
    "family_stress",
    "financial_stress",
    "illness",
    "late_night",
    "poor_diet",
    "stress",
    "travel",
    "work_stress",
];

/// Normalizer for turning raw logs into canonical shapes
pub struct Normalizer;

impl Normalizer {
    /// Reduce either symptom encoding to the canonical map shape
    pub fn symptoms(encoding: Option<&SymptomEncoding>) -> NormalizedSymptoms {
        let mut normalized = NormalizedSymptoms::default();

        match encoding {
            None => {}
            Some(SymptomEncoding::Map(entries)) => {
                for (name, raw) in entries {
                    if let Some(severity) = coerce_severity(raw) {
                        keep_max(&mut normalized.symptoms, &symptom_name(name), severity);
                    }
                }
            }
            Some(SymptomEncoding::Array(entries)) => {
                for entry in entries {
                    let name = symptom_name(&entry.name);
                    if name.is_empty() {
                        continue;
                    }
                    if let Some(severity) = coerce_severity(&entry.severity) {
                        let target = if entry.is_stressor {
                            &mut normalized.stressors
                        } else {
                            &mut normalized.symptoms
                        };
                        keep_max(target, &name, severity);
                    }
                }
            }
        }

        normalized
    }

    /// Merge every log of one user and date, in log order.
    ///
    /// Scalars: last non-null wins. Symptoms: union, higher severity wins.
    /// Returns `None` for an empty slice.
    pub fn merge_day(logs: &[DailyLog]) -> Option<MergedDay> {
        let first = logs.first()?;
        let mut merged = MergedDay {
            user_id: first.user_id.clone(),
            date: first.date,
            sleep_hours: None,
            sleep_quality: None,
            disruptions: None,
            mood: None,
            symptoms: NormalizedSymptoms::default(),
            context_tags: BTreeSet::new(),
            log_count: 0,
        };

        for log in logs {
            if log.sleep_hours.is_some() {
                merged.sleep_hours = log.sleep_hours;
            }
            if log.sleep_quality.is_some() {
                merged.sleep_quality = log.sleep_quality;
            }
            if log.disruptions.is_some() {
                merged.disruptions = log.disruptions;
            }
            if log.mood.is_some() {
                merged.mood = log.mood;
            }

            merged
                .symptoms
                .merge_max(&Self::symptoms(log.symptoms.as_ref()));
            merged.context_tags.extend(
                log.context_tags
                    .iter()
                    .map(|tag| tag.to_lowercase())
                    .filter(|tag| !tag.is_empty()),
            );
            merged.log_count += 1;
        }

        Some(merged)
    }

    /// Group logs by user, then by date, merging each day.
    ///
    /// Input order is preserved within a day, so callers must pass logs in
    /// write order.
    pub fn merge_by_user(logs: &[DailyLog]) -> HashMap<String, BTreeMap<NaiveDate, MergedDay>> {
        let mut grouped: HashMap<&str, BTreeMap<NaiveDate, Vec<DailyLog>>> = HashMap::new();
        for log in logs {
            grouped
                .entry(log.user_id.as_str())
                .or_default()
                .entry(log.date)
                .or_default()
                .push(log.clone());
        }

        grouped
            .into_iter()
            .map(|(user_id, days)| {
                let merged = days
                    .into_iter()
                    .filter_map(|(date, day_logs)| {
                        Self::merge_day(&day_logs).map(|merged| (date, merged))
                    })
                    .collect();
                (user_id.to_string(), merged)
            })
            .collect()
    }

    /// Distinct context tags of a day that are in the stressor vocabulary
    pub fn triggered_stressor_tags(day: &MergedDay) -> BTreeSet<String> {
        day.context_tags
            .iter()
            .filter(|tag| is_stressor_tag(tag))
            .cloned()
            .collect()
    }
}

/// Reader for daily log payloads
pub struct LogIngest;

impl LogIngest {
    /// Parse a JSON array of logs
    pub fn parse_array(json: &str) -> Result<Vec<DailyLog>, EngineError> {
        let logs: Vec<DailyLog> = serde_json::from_str(json)?;
        Ok(logs)
    }

    /// Parse NDJSON (one log per line); blank lines are skipped
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<DailyLog>, EngineError> {
        let mut logs = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<DailyLog>(trimmed) {
                Ok(log) => logs.push(log),
                Err(e) => {
                    return Err(EngineError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(logs)
    }

    /// Array if the payload starts with `[`, NDJSON otherwise
    pub fn parse(payload: &str) -> Result<Vec<DailyLog>, EngineError> {
        if payload.trim_start().starts_with('[') {
            Self::parse_array(payload)
        } else {
            Self::parse_ndjson(payload)
        }
    }
}

/// Lower-cased exact match against [`STRESSOR_TAGS`]
pub fn is_stressor_tag(tag: &str) -> bool {
    let lowered = tag.to_lowercase();
    STRESSOR_TAGS.contains(&lowered.as_str())
}

/// Coerce a raw severity to 0-5; zero or negative means "not present"
fn coerce_severity(raw: &serde_json::Value) -> Option<f64> {
    let severity = match raw {
        serde_json::Value::Null | serde_json::Value::Bool(true) => DEFAULT_PRESENT_SEVERITY,
        serde_json::Value::Bool(false) => return None,
        other => number_from_value(other).unwrap_or(DEFAULT_PRESENT_SEVERITY),
    };

    (severity > 0.0).then(|| severity.min(MAX_SEVERITY))
}

fn symptom_name(raw: &str) -> String {
    raw.trim().to_string()
}
