//! Engine facade
//!
//! [`InsightsEngine`] binds a validated [`EngineConfig`] to a store and exposes
//! the engine's external interfaces:
//! 1. Readiness read/compute (write-through) and the batch scorer
//! 2. The cohort benchmark run
//! 3. The insights read API (benchmarks and correlations modes)
//!
//! Every entry point takes its reference date from the caller.

use crate::benchmark::{AggregationReport, BenchmarkAggregator};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::insights::{BenchmarkInsights, CorrelationInsight, InsightsPresenter};
use crate::normalizer::LogIngest;
use crate::readiness::{BatchReport, ReadinessScorer};
use crate::store::{HealthStore, MemoryStore};
use crate::types::ComputedScore;
use chrono::NaiveDate;
use tracing::info;

/// Insights engine over a store
pub struct InsightsEngine<S: HealthStore> {
    config: EngineConfig,
    store: S,
}

impl<S: HealthStore> InsightsEngine<S> {
    /// Create an engine with default settings
    pub fn new(store: S) -> Self {
        Self {
            config: EngineConfig::default(),
            store,
        }
    }

    /// Create an engine with a custom config, rejecting invalid values
    pub fn with_config(store: S, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Recompute and store the readiness row for (user, date)
    pub fn score_day(
        &mut self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, EngineError> {
        ReadinessScorer::score_day(&mut self.store, user_id, date)
    }

    /// Stored readiness row, computed on demand when absent
    pub fn readiness(
        &mut self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, EngineError> {
        ReadinessScorer::read_or_compute(&mut self.store, user_id, date)
    }

    /// Score every user who logged on `date`
    pub fn score_all(&mut self, date: NaiveDate) -> Result<BatchReport, EngineError> {
        ReadinessScorer::score_all(&mut self.store, date)
    }

    /// Recompute cohort benchmarks as of `today`
    pub fn run_benchmarks(&mut self, today: NaiveDate) -> AggregationReport {
        BenchmarkAggregator::new(&self.config).run(&mut self.store, today)
    }

    /// Benchmarks mode of the insights API
    pub fn benchmark_insights(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<BenchmarkInsights, EngineError> {
        InsightsPresenter::new(&self.config).benchmarks(&self.store, user_id, today)
    }

    /// Correlations mode of the insights API
    pub fn correlation_insights(
        &self,
        user_id: &str,
    ) -> Result<Vec<CorrelationInsight>, EngineError> {
        InsightsPresenter::new(&self.config).correlations(&self.store, user_id)
    }
}

impl InsightsEngine<MemoryStore> {
    /// Load a store snapshot from JSON
    pub fn from_snapshot(json: &str, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_config(MemoryStore::from_json(json)?, config)
    }

    /// Serialize the store snapshot to JSON
    pub fn snapshot(&self) -> Result<String, EngineError> {
        Ok(self.store.to_json()?)
    }

    /// Append logs from a JSON array or NDJSON payload, returning how many
    pub fn import_logs(&mut self, payload: &str) -> Result<usize, EngineError> {
        let logs = LogIngest::parse(payload)?;
        let count = logs.len();
        for log in logs {
            self.store.add_log(log);
        }
        info!(count, "logs imported");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn symptom_log(user_id: &str, date: NaiveDate, entries: &[(&str, f64)]) -> DailyLog {
        let mut log = DailyLog::new(user_id, date);
        log.symptoms = Some(SymptomEncoding::Map(
            entries
                .iter()
                .map(|(name, severity)| (name.to_string(), json!(severity)))
                .collect(),
        ));
        log
    }

    fn peri_profile(user_id: &str) -> Profile {
        Profile {
            user_id: user_id.to_string(),
            life_stage: Some("Perimenopause".to_string()),
            date_of_birth: Some("1977-01-10".to_string()),
            onboarding_complete: true,
        }
    }

    /// A 47-year-old in perimenopause averaging 1.2, 29 mild peers and 50
    /// severe ones
    fn population() -> MemoryStore {
        let mut store = MemoryStore::new();

        store.put_profile(peri_profile("me"));
        for n in 1..=4 {
            store.add_log(symptom_log("me", days_ago(n), &[("hot_flashes", 1.0)]));
        }
        store.add_log(symptom_log("me", days_ago(1), &[("fatigue", 2.0)]));

        for i in 0..29 {
            let user = format!("mild-{i}");
            store.put_profile(peri_profile(&user));
            store.add_log(symptom_log(&user, days_ago(2), &[("hot_flashes", 1.0)]));
        }
        for i in 0..50 {
            let user = format!("severe-{i}");
            store.put_profile(peri_profile(&user));
            store.add_log(symptom_log(&user, days_ago(2), &[("night_sweats", 4.0)]));
        }
        store
    }

    #[test]
    fn test_widened_cohort_end_to_end() {
        let mut engine = InsightsEngine::new(population());

        let report = engine.run_benchmarks(today());
        assert_eq!(report.errors, 0);
        assert_eq!(report.cohorts_processed, 2);

        let insights = engine.benchmark_insights("me", today()).unwrap();
        assert_eq!(insights.user_cohort_key, "perimenopause_45-49_mild");

        let cohort = insights.cohort.unwrap();
        assert_eq!(cohort.key, "perimenopause_45-49");
        assert_eq!(cohort.sample_size, 80);

        let order: Vec<&str> = insights.insights.iter().map(|i| i.symptom.as_str()).collect();
        assert_eq!(order, vec!["hot_flashes", "fatigue", "night_sweats"]);
        // 4 days against p75 = 1
        assert_eq!(insights.insights[0].percentile, Some(99));
    }

    #[test]
    fn test_benchmark_run_is_idempotent() {
        let mut engine = InsightsEngine::new(population());
        engine.run_benchmarks(today());
        let first = engine.store().benchmarks.clone();
        engine.run_benchmarks(today());
        assert_eq!(engine.store().benchmarks, first);
    }

    #[test]
    fn test_readiness_write_through() {
        let mut engine = InsightsEngine::new(population());
        assert!(engine.store().scores.is_empty());

        let score = engine.readiness("me", days_ago(1)).unwrap().unwrap();
        // two symptoms averaging 1.5: 100 - 20 - 4.5
        assert_eq!(score.components.symptom, 76);
        assert_eq!(score.streak, 4);
        assert_eq!(engine.store().scores.len(), 1);

        assert!(engine.readiness("me", today()).unwrap().is_none());
    }

    #[test]
    fn test_score_all_counts_users() {
        let mut engine = InsightsEngine::new(population());
        let report = engine.score_all(days_ago(2)).unwrap();
        assert_eq!(report.scored, 80);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            recent_window_days: 120,
            ..EngineConfig::default()
        };
        assert!(matches!(
            InsightsEngine::with_config(MemoryStore::new(), config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_import_and_snapshot() {
        let mut engine = InsightsEngine::new(MemoryStore::new());
        let ndjson = r#"{"user_id":"u1","date":"2024-06-14","mood":5}
{"user_id":"u1","date":"2024-06-15","symptoms":[{"name":"fatigue","severity":3}]}"#;
        assert_eq!(engine.import_logs(ndjson).unwrap(), 2);

        let saved = engine.snapshot().unwrap();
        let mut restored = InsightsEngine::from_snapshot(&saved, EngineConfig::default()).unwrap();
        assert_eq!(restored.store(), engine.store());

        let score = restored.score_day("u1", today()).unwrap().unwrap();
        assert_eq!(score.streak, 2);
    }

    #[test]
    fn test_bad_snapshot_is_an_error() {
        assert!(InsightsEngine::from_snapshot("{not json", EngineConfig::default()).is_err());
    }
}
