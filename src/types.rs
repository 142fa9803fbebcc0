//! Core types for the insights engine
//!
//! This module defines the records that flow between the store and each
//! component: raw daily logs, their normalized same-day merge, profiles, and
//! the two derived tables (computed scores and benchmark aggregates).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Self-reported sleep quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Terrible,
    Poor,
    Good,
    Great,
}

impl SleepQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepQuality::Terrible => "terrible",
            SleepQuality::Poor => "poor",
            SleepQuality::Good => "good",
            SleepQuality::Great => "great",
        }
    }

    /// Case-insensitive parse; unknown labels yield `None`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "terrible" => Some(SleepQuality::Terrible),
            "poor" => Some(SleepQuality::Poor),
            "good" => Some(SleepQuality::Good),
            "great" => Some(SleepQuality::Great),
            _ => None,
        }
    }
}

/// One record of the legacy array symptom encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacySymptom {
    pub name: String,
    /// Raw severity as sent by the client (number, numeric string, or junk)
    #[serde(default)]
    pub severity: serde_json::Value,
    /// Missing, `null` or non-boolean means "not a stressor"
    #[serde(default, alias = "isStressor", deserialize_with = "lenient_bool")]
    pub is_stressor: bool,
}

/// The two historical symptom encodings found in stored logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymptomEncoding {
    /// Legacy `[{name, severity, isStressor?}]`
    Array(Vec<LegacySymptom>),
    /// Current `{name: severity}`
    Map(BTreeMap<String, serde_json::Value>),
}

/// One daily check-in as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    #[serde(alias = "userId")]
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "lenient_symptoms")]
    pub symptoms: Option<SymptomEncoding>,
    /// Mood on a 1-5 scale
    #[serde(default, deserialize_with = "lenient_mood")]
    pub mood: Option<u8>,
    #[serde(default, alias = "sleepHours", deserialize_with = "lenient_f64")]
    pub sleep_hours: Option<f64>,
    #[serde(default, alias = "sleepQuality", deserialize_with = "lenient_sleep_quality")]
    pub sleep_quality: Option<SleepQuality>,
    /// Night-time disruptions
    #[serde(default, deserialize_with = "lenient_u32")]
    pub disruptions: Option<u32>,
    #[serde(default, alias = "contextTags", deserialize_with = "lenient_tags")]
    pub context_tags: Vec<String>,
}

impl DailyLog {
    /// Empty log for a user and date
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
            symptoms: None,
            mood: None,
            sleep_hours: None,
            sleep_quality: None,
            disruptions: None,
            context_tags: Vec::new(),
        }
    }
}

/// Canonical `{name: severity}` shape shared by scoring and aggregation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSymptoms {
    /// Non-stressor symptoms
    pub symptoms: BTreeMap<String, f64>,
    /// Entries flagged as stressors in the legacy encoding
    pub stressors: BTreeMap<String, f64>,
}

impl NormalizedSymptoms {
    /// Union with another set, keeping the higher severity on collisions
    pub fn merge_max(&mut self, other: &NormalizedSymptoms) {
        for (name, severity) in &other.symptoms {
            keep_max(&mut self.symptoms, name, *severity);
        }
        for (name, severity) in &other.stressors {
            keep_max(&mut self.stressors, name, *severity);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty() && self.stressors.is_empty()
    }
}

pub(crate) fn keep_max(map: &mut BTreeMap<String, f64>, name: &str, severity: f64) {
    map.entry(name.to_string())
        .and_modify(|current| {
            if severity > *current {
                *current = severity;
            }
        })
        .or_insert(severity);
}

/// All of one user's logs for one date, merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDay {
    pub user_id: String,
    pub date: NaiveDate,
    pub sleep_hours: Option<f64>,
    pub sleep_quality: Option<SleepQuality>,
    pub disruptions: Option<u32>,
    pub mood: Option<u8>,
    pub symptoms: NormalizedSymptoms,
    /// Lower-cased context tags from every log of the day
    pub context_tags: BTreeSet<String>,
    /// Number of raw logs folded into this day
    pub log_count: usize,
}

/// Per-user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(alias = "userId")]
    pub user_id: String,
    /// Free-text life stage as entered by the user
    #[serde(default, alias = "lifeStage")]
    pub life_stage: Option<String>,
    /// Raw date of birth, normally `YYYY-MM-DD`
    #[serde(default, alias = "dateOfBirth")]
    pub date_of_birth: Option<String>,
    #[serde(default, alias = "onboardingComplete")]
    pub onboarding_complete: bool,
}

/// Readiness sub-scores, each in 10-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub sleep: u8,
    pub mood: u8,
    pub symptom: u8,
    pub stressor: u8,
}

/// One row per (user, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedScore {
    pub user_id: String,
    pub date: NaiveDate,
    /// Composite readiness in 5-99
    pub readiness: u8,
    pub components: ComponentScores,
    pub streak: u32,
    /// Narrative text owned by an external generator
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// One row per (cohort key, symptom)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkAggregate {
    pub cohort_key: String,
    pub symptom: String,
    /// Share of members who logged the symptom in the recent window (0-100)
    pub prevalence_pct: f64,
    /// Mean distinct days logged per member, non-loggers counted as zero
    pub avg_frequency: f64,
    /// Mean of per-member average severity, loggers only
    pub avg_severity: f64,
    pub frequency_p25: f64,
    pub frequency_p50: f64,
    pub frequency_p75: f64,
    pub sample_size: u32,
}

/// Sign of a discovered factor/symptom relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationDirection {
    Positive,
    Negative,
}

/// Externally computed factor→symptom correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub user_id: String,
    pub factor: String,
    pub symptom: String,
    pub direction: CorrelationDirection,
    /// Confidence in 0-1
    pub confidence: f64,
    /// Relative effect as a fraction (0.35 = 35%)
    pub effect_size: f64,
    /// Days on which the factor was present
    pub factor_occurrences: u32,
    /// Days on which factor and symptom co-occurred
    pub co_occurrences: u32,
}

fn lenient_symptoms<'de, D>(deserializer: D) -> Result<Option<SymptomEncoding>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        // Entries are read one at a time so a bad record only drops itself
        Some(serde_json::Value::Array(entries)) => Some(SymptomEncoding::Array(
            entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
        )),
        Some(other) => serde_json::from_value(other).ok(),
        None => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
}

fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .filter(|n| *n >= 0.0)
        .map(|n| n.round() as u32))
}

fn lenient_mood<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from_value)
        .map(|n| n.round().clamp(1.0, 5.0) as u8))
}

fn lenient_sleep_quality<'de, D>(deserializer: D) -> Result<Option<SleepQuality>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(SleepQuality::parse))
}

/// Read a finite number from a JSON number or numeric string
pub(crate) fn number_from_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}
