//! Insights presentation
//!
//! Request-time read path. "Benchmarks" mode places a user inside their
//! cohort: it looks up the stored rows for the user's exact cohort key, then
//! the widened key, and finally falls back to generic population figures.
//! Each benchmarked symptom is joined with the user's own 28-day frequency
//! through the percentile estimator.
//!
//! "Correlations" mode is a pass-through of externally computed rows with a
//! generated sentence per row.

use crate::benchmark::{recent_average_severity, symptom_frequency, DayHistory};
use crate::cohort::CohortKey;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::normalizer::Normalizer;
use crate::percentile::{estimate_percentile, round2};
use crate::store::HealthStore;
use crate::types::{BenchmarkAggregate, CorrelationDirection, CorrelationRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prevalence at or above which a symptom is "Very common"
pub const VERY_COMMON_PCT: f64 = 70.0;

/// Prevalence at or above which a symptom is "Common"
pub const COMMON_PCT: f64 = 40.0;

/// Shown alongside the generic figures
pub const INSUFFICIENT_DATA_MESSAGE: &str =
    "Not enough people in your group yet for personalized comparisons. Showing general figures instead.";

/// (symptom, prevalence %, average days per 28) for the general population
const GENERIC_BENCHMARKS: &[(&str, f64, f64)] = &[
    ("hot_flashes", 75.0, 10.0),
    ("night_sweats", 60.0, 8.0),
    ("fatigue", 70.0, 12.0),
    ("brain_fog", 55.0, 7.0),
    ("mood_swings", 50.0, 6.0),
    ("joint_pain", 45.0, 6.0),
];

/// Three-level commonality label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Commonality {
    #[serde(rename = "Very common")]
    VeryCommon,
    #[serde(rename = "Common")]
    Common,
    #[serde(rename = "Less common")]
    LessCommon,
}

impl Commonality {
    pub fn from_prevalence(prevalence_pct: f64) -> Self {
        if prevalence_pct >= VERY_COMMON_PCT {
            Commonality::VeryCommon
        } else if prevalence_pct >= COMMON_PCT {
            Commonality::Common
        } else {
            Commonality::LessCommon
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Commonality::VeryCommon => "Very common",
            Commonality::Common => "Common",
            Commonality::LessCommon => "Less common",
        }
    }
}

/// The cohort whose rows were used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortDescriptor {
    pub key: String,
    pub label: String,
    pub sample_size: u32,
}

/// One symptom of the user joined with cohort figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomInsight {
    pub symptom: String,
    /// Days logged in the recent window
    pub user_frequency: u32,
    /// Mean of the logged days' severities
    pub user_severity: Option<f64>,
    pub cohort_prevalence_pct: f64,
    pub cohort_avg_frequency: f64,
    /// Position within the cohort; absent for generic figures
    pub percentile: Option<u8>,
    pub commonality: Commonality,
}

/// Response of benchmarks mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkInsights {
    pub user_id: String,
    /// Exact cohort key computed for the user
    pub user_cohort_key: String,
    /// `None` when generic figures are shown
    pub cohort: Option<CohortDescriptor>,
    pub insights: Vec<SymptomInsight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BenchmarkInsights {
    pub fn is_personalized(&self) -> bool {
        self.cohort.is_some()
    }
}

/// A correlation row with its generated sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationInsight {
    pub factor: String,
    pub symptom: String,
    pub direction: CorrelationDirection,
    pub confidence: f64,
    pub effect_size: f64,
    pub factor_occurrences: u32,
    pub co_occurrences: u32,
    pub label: String,
}

impl From<CorrelationRecord> for CorrelationInsight {
    fn from(record: CorrelationRecord) -> Self {
        let label = correlation_label(
            &record.factor,
            record.direction,
            &record.symptom,
            record.effect_size,
        );
        Self {
            factor: record.factor,
            symptom: record.symptom,
            direction: record.direction,
            confidence: record.confidence,
            effect_size: record.effect_size,
            factor_occurrences: record.factor_occurrences,
            co_occurrences: record.co_occurrences,
            label,
        }
    }
}

/// Read-side presenter
pub struct InsightsPresenter<'a> {
    config: &'a EngineConfig,
}

impl<'a> InsightsPresenter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Benchmarks mode for one user as of `today`
    pub fn benchmarks<S: HealthStore + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<BenchmarkInsights, EngineError> {
        let recent_start = self.config.recent_window_start(today)?;
        let logs = store.logs_in_range(Some(user_id), recent_start, today)?;
        let histories = Normalizer::merge_by_user(&logs);
        let history = histories.get(user_id);

        let profile = store.profile(user_id)?;
        let average = recent_average_severity(history, recent_start, today)
            .unwrap_or(self.config.default_average_severity);
        let key = CohortKey::build(
            profile.as_ref().and_then(|p| p.life_stage.as_deref()),
            profile.as_ref().and_then(|p| p.date_of_birth.as_deref()),
            average,
            today,
        );

        let mut chosen = None;
        for candidate in [key, key.widened()] {
            let rows = store.benchmarks_for(&candidate.to_string())?;
            if !rows.is_empty() {
                chosen = Some((candidate, rows));
                break;
            }
        }

        let Some((cohort_key, rows)) = chosen else {
            debug!(user_id, key = %key, "no cohort benchmarks, using generic figures");
            return Ok(BenchmarkInsights {
                user_id: user_id.to_string(),
                user_cohort_key: key.to_string(),
                cohort: None,
                insights: generic_insights(history, recent_start, today),
                message: Some(INSUFFICIENT_DATA_MESSAGE.to_string()),
            });
        };

        debug!(user_id, key = %cohort_key, rows = rows.len(), "cohort benchmarks found");
        let cohort = CohortDescriptor {
            key: cohort_key.to_string(),
            label: cohort_key.label(),
            sample_size: rows.iter().map(|row| row.sample_size).max().unwrap_or(0),
        };

        let mut insights: Vec<SymptomInsight> = rows
            .iter()
            .map(|row| personal_insight(row, history, recent_start, today))
            .collect();
        rank(&mut insights);

        Ok(BenchmarkInsights {
            user_id: user_id.to_string(),
            user_cohort_key: key.to_string(),
            cohort: Some(cohort),
            insights,
            message: None,
        })
    }

    /// Correlations mode: stored rows, most confident first
    pub fn correlations<S: HealthStore + ?Sized>(
        &self,
        store: &S,
        user_id: &str,
    ) -> Result<Vec<CorrelationInsight>, EngineError> {
        let mut records = store.correlations_for(user_id)?;
        records.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.factor.cmp(&b.factor))
                .then_with(|| a.symptom.cmp(&b.symptom))
        });
        Ok(records.into_iter().map(CorrelationInsight::from).collect())
    }
}

/// "`<Factor>` increases|reduces `<symptom>` by `N%`"
pub fn correlation_label(
    factor: &str,
    direction: CorrelationDirection,
    symptom: &str,
    effect_size: f64,
) -> String {
    let verb = match direction {
        CorrelationDirection::Positive => "increases",
        CorrelationDirection::Negative => "reduces",
    };
    let percent = if effect_size.is_finite() {
        (effect_size.abs() * 100.0).round()
    } else {
        0.0
    };
    format!(
        "{} {} {} by {}%",
        capitalize(&humanize(factor)),
        verb,
        humanize(symptom).to_lowercase(),
        percent
    )
}

fn personal_insight(
    row: &BenchmarkAggregate,
    history: Option<&DayHistory>,
    recent_start: NaiveDate,
    today: NaiveDate,
) -> SymptomInsight {
    let (frequency, severity) = symptom_frequency(history, &row.symptom, recent_start, today);
    SymptomInsight {
        symptom: row.symptom.clone(),
        user_frequency: frequency,
        user_severity: severity.map(round2),
        cohort_prevalence_pct: row.prevalence_pct,
        cohort_avg_frequency: row.avg_frequency,
        percentile: Some(estimate_percentile(
            f64::from(frequency),
            row.frequency_p25,
            row.frequency_p50,
            row.frequency_p75,
        )),
        commonality: Commonality::from_prevalence(row.prevalence_pct),
    }
}

fn generic_insights(
    history: Option<&DayHistory>,
    recent_start: NaiveDate,
    today: NaiveDate,
) -> Vec<SymptomInsight> {
    let mut insights: Vec<SymptomInsight> = GENERIC_BENCHMARKS
        .iter()
        .map(|&(symptom, prevalence, frequency)| {
            let (user_frequency, severity) =
                symptom_frequency(history, symptom, recent_start, today);
            SymptomInsight {
                symptom: symptom.to_string(),
                user_frequency,
                user_severity: severity.map(round2),
                cohort_prevalence_pct: prevalence,
                cohort_avg_frequency: frequency,
                percentile: None,
                commonality: Commonality::from_prevalence(prevalence),
            }
        })
        .collect();
    rank(&mut insights);
    insights
}

/// User frequency desc, then prevalence desc, then name
fn rank(insights: &mut [SymptomInsight]) {
    insights.sort_by(|a, b| {
        b.user_frequency
            .cmp(&a.user_frequency)
            .then_with(|| b.cohort_prevalence_pct.total_cmp(&a.cohort_prevalence_pct))
            .then_with(|| a.symptom.cmp(&b.symptom))
    });
}

fn humanize(raw: &str) -> String {
    raw.trim().replace('_', " ")
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{DailyLog, Profile, SymptomEncoding};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn days_ago(n: i64) -> NaiveDate {
        today() - Duration::days(n)
    }

    fn row(key: &str, symptom: &str, prevalence: f64, quartiles: (f64, f64, f64)) -> BenchmarkAggregate {
        BenchmarkAggregate {
            cohort_key: key.to_string(),
            symptom: symptom.to_string(),
            prevalence_pct: prevalence,
            avg_frequency: quartiles.1,
            avg_severity: 2.0,
            frequency_p25: quartiles.0,
            frequency_p50: quartiles.1,
            frequency_p75: quartiles.2,
            sample_size: 80,
        }
    }

    fn log(date: NaiveDate, entries: &[(&str, f64)]) -> DailyLog {
        let mut log = DailyLog::new("u1", date);
        log.symptoms = Some(SymptomEncoding::Map(
            entries
                .iter()
                .map(|(name, severity)| (name.to_string(), json!(severity)))
                .collect(),
        ));
        log
    }

    /// Perimenopausal 47-year-old with a mild recent history
    fn store_with_user() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.put_profile(Profile {
            user_id: "u1".to_string(),
            life_stage: Some("Perimenopause".to_string()),
            date_of_birth: Some("1977-01-10".to_string()),
            onboarding_complete: true,
        });
        for n in 1..=10 {
            store.add_log(log(days_ago(n), &[("hot_flashes", 1.0)]));
        }
        store.add_log(log(days_ago(3), &[("night_sweats", 2.0)]));
        store
    }

    #[test]
    fn test_commonality_thresholds() {
        assert_eq!(Commonality::from_prevalence(70.0), Commonality::VeryCommon);
        assert_eq!(Commonality::from_prevalence(69.9), Commonality::Common);
        assert_eq!(Commonality::from_prevalence(40.0), Commonality::Common);
        assert_eq!(Commonality::from_prevalence(39.9), Commonality::LessCommon);
        assert_eq!(Commonality::VeryCommon.as_str(), "Very common");
    }

    #[test]
    fn test_exact_cohort_rows_are_used() {
        let mut store = store_with_user();
        // user average: (10 * 1.0 + 2.0) / 11 < 1.5, so mild
        let key = "perimenopause_45-49_mild";
        store
            .insert_benchmarks(vec![
                row(key, "night_sweats", 72.0, (1.0, 4.0, 8.0)),
                row(key, "hot_flashes", 65.0, (2.0, 5.0, 10.0)),
                row(key, "fatigue", 30.0, (0.0, 2.0, 6.0)),
            ])
            .unwrap();

        let config = EngineConfig::default();
        let result = InsightsPresenter::new(&config)
            .benchmarks(&store, "u1", today())
            .unwrap();

        assert!(result.is_personalized());
        assert_eq!(result.user_cohort_key, key);
        let cohort = result.cohort.unwrap();
        assert_eq!(cohort.label, "Perimenopause, ages 45-49, mild symptoms");
        assert_eq!(cohort.sample_size, 80);

        let order: Vec<&str> = result.insights.iter().map(|i| i.symptom.as_str()).collect();
        assert_eq!(order, vec!["hot_flashes", "night_sweats", "fatigue"]);

        let hot = &result.insights[0];
        assert_eq!(hot.user_frequency, 10);
        assert_eq!(hot.user_severity, Some(1.0));
        // 10 sits exactly on p75
        assert_eq!(hot.percentile, Some(75));
        assert_eq!(hot.commonality, Commonality::Common);

        let sweats = &result.insights[1];
        assert_eq!(sweats.user_frequency, 1);
        assert_eq!(sweats.percentile, Some(25));
        assert_eq!(sweats.commonality, Commonality::VeryCommon);

        let fatigue = &result.insights[2];
        assert_eq!(fatigue.user_frequency, 0);
        assert_eq!(fatigue.user_severity, None);
        assert_eq!(fatigue.percentile, Some(0));
    }

    #[test]
    fn test_falls_back_to_widened_cohort() {
        let mut store = store_with_user();
        store
            .insert_benchmarks(vec![row("perimenopause_45-49", "hot_flashes", 80.0, (2.0, 5.0, 10.0))])
            .unwrap();

        let config = EngineConfig::default();
        let result = InsightsPresenter::new(&config)
            .benchmarks(&store, "u1", today())
            .unwrap();

        let cohort = result.cohort.unwrap();
        assert_eq!(cohort.key, "perimenopause_45-49");
        assert_eq!(cohort.label, "Perimenopause, ages 45-49");
        assert_eq!(result.user_cohort_key, "perimenopause_45-49_mild");
        assert_eq!(result.insights.len(), 1);
    }

    #[test]
    fn test_generic_figures_when_no_rows() {
        let store = store_with_user();
        let config = EngineConfig::default();
        let result = InsightsPresenter::new(&config)
            .benchmarks(&store, "u1", today())
            .unwrap();

        assert!(!result.is_personalized());
        assert_eq!(result.message.as_deref(), Some(INSUFFICIENT_DATA_MESSAGE));
        assert_eq!(result.insights.len(), GENERIC_BENCHMARKS.len());
        assert!(result.insights.iter().all(|i| i.percentile.is_none()));
        // the user's own symptoms surface first
        assert_eq!(result.insights[0].symptom, "hot_flashes");
        assert_eq!(result.insights[1].symptom, "night_sweats");
    }

    #[test]
    fn test_unknown_user_gets_generic_figures() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let result = InsightsPresenter::new(&config)
            .benchmarks(&store, "ghost", today())
            .unwrap();
        assert_eq!(result.user_cohort_key, "unknown_unknown_age_moderate");
        assert!(result.cohort.is_none());
        // nobody logged anything: ordered by prevalence
        assert_eq!(result.insights[0].symptom, "hot_flashes");
        assert_eq!(result.insights[1].symptom, "fatigue");
    }

    #[test]
    fn test_oversized_recent_window_is_an_error() {
        let store = MemoryStore::new();
        let config = EngineConfig {
            recent_window_days: i64::MAX,
            ..EngineConfig::default()
        };
        let result = InsightsPresenter::new(&config).benchmarks(&store, "ghost", today());
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_correlation_labels() {
        assert_eq!(
            correlation_label("caffeine", CorrelationDirection::Positive, "Hot_Flashes", 0.234),
            "Caffeine increases hot flashes by 23%"
        );
        assert_eq!(
            correlation_label("late_night", CorrelationDirection::Negative, "sleep", -0.4),
            "Late night reduces sleep by 40%"
        );
    }

    #[test]
    fn test_correlations_sorted_by_confidence() {
        let mut store = MemoryStore::new();
        let record = |factor: &str, confidence: f64| CorrelationRecord {
            user_id: "u1".to_string(),
            factor: factor.to_string(),
            symptom: "fatigue".to_string(),
            direction: CorrelationDirection::Positive,
            confidence,
            effect_size: 0.5,
            factor_occurrences: 10,
            co_occurrences: 6,
        };
        store.add_correlation(record("alcohol", 0.4));
        store.add_correlation(record("caffeine", 0.9));
        store.add_correlation(CorrelationRecord {
            user_id: "u2".to_string(),
            ..record("travel", 1.0)
        });

        let config = EngineConfig::default();
        let rows = InsightsPresenter::new(&config)
            .correlations(&store, "u1")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].factor, "caffeine");
        assert_eq!(rows[0].label, "Caffeine increases fatigue by 50%");
        assert_eq!(rows[1].co_occurrences, 6);
    }
}
