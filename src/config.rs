//! Engine configuration
//!
//! Every field has a default, so an empty JSON object is a valid config file.

use crate::error::EngineError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Minimum cohort membership before benchmark rows are published
pub const DEFAULT_MIN_COHORT_SIZE: usize = 50;

/// Rolling window (days) used to discover which symptoms a cohort logs
pub const DEFAULT_BENCHMARK_WINDOW_DAYS: i64 = 90;

/// Recent window (days) used for frequency, prevalence and average severity
pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 28;

/// Longest window accepted for either history scan (ten years)
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Average severity assumed for users with no qualifying logs ("moderate")
pub const DEFAULT_AVERAGE_SEVERITY: f64 = 2.0;

/// Tunables shared by the scorer, the aggregator and the insights layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// k-anonymity gate: cohorts below this size are never materialized
    pub min_cohort_size: usize,
    /// Days of history scanned by the aggregator
    pub benchmark_window_days: i64,
    /// Days of history behind every frequency and severity statistic
    pub recent_window_days: i64,
    /// Fallback average severity when a user has nothing to average
    pub default_average_severity: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_cohort_size: DEFAULT_MIN_COHORT_SIZE,
            benchmark_window_days: DEFAULT_BENCHMARK_WINDOW_DAYS,
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            default_average_severity: DEFAULT_AVERAGE_SEVERITY,
        }
    }
}

impl EngineConfig {
    /// Check the window and threshold invariants
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.min_cohort_size == 0 {
            return Err(EngineError::InvalidConfig(
                "min_cohort_size must be at least 1".to_string(),
            ));
        }
        if self.recent_window_days <= 0 || self.benchmark_window_days <= 0 {
            return Err(EngineError::InvalidConfig(
                "window lengths must be positive".to_string(),
            ));
        }
        if self.benchmark_window_days > MAX_WINDOW_DAYS {
            return Err(EngineError::InvalidConfig(format!(
                "benchmark_window_days ({}) exceeds the {} day maximum",
                self.benchmark_window_days, MAX_WINDOW_DAYS
            )));
        }
        if self.recent_window_days > self.benchmark_window_days {
            return Err(EngineError::InvalidConfig(format!(
                "recent_window_days ({}) exceeds benchmark_window_days ({})",
                self.recent_window_days, self.benchmark_window_days
            )));
        }
        if !self.default_average_severity.is_finite() || self.default_average_severity < 0.0 {
            return Err(EngineError::InvalidConfig(
                "default_average_severity must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    /// First date of the aggregator's history scan ending at `today`
    pub fn benchmark_window_start(&self, today: NaiveDate) -> Result<NaiveDate, EngineError> {
        window_start(today, self.benchmark_window_days)
    }

    /// First date of the recent window ending at `today`
    pub fn recent_window_start(&self, today: NaiveDate) -> Result<NaiveDate, EngineError> {
        window_start(today, self.recent_window_days)
    }

    /// Load and validate a config from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize config to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// `today - days`, refusing lengths outside `0..=MAX_WINDOW_DAYS` and dates
/// chrono cannot represent
fn window_start(today: NaiveDate, days: i64) -> Result<NaiveDate, EngineError> {
    if !(0..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(EngineError::InvalidConfig(format!(
            "window of {} days is outside 0..={}",
            days, MAX_WINDOW_DAYS
        )));
    }
    today
        .checked_sub_signed(Duration::days(days))
        .ok_or_else(|| {
            EngineError::InvalidConfig(format!("{} days before {} is out of range", days, today))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.min_cohort_size, 50);
        assert_eq!(config.recent_window_days, 28);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(r#"{"min_cohort_size": 10}"#).unwrap();
        assert_eq!(config.min_cohort_size, 10);
        assert_eq!(config.benchmark_window_days, 90);
    }

    #[test]
    fn test_rejects_inverted_windows() {
        let result =
            EngineConfig::from_json(r#"{"recent_window_days": 120, "benchmark_window_days": 90}"#);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_cohort_size() {
        let result = EngineConfig::from_json(r#"{"min_cohort_size": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_oversized_window() {
        let result = EngineConfig::from_json(
            r#"{"benchmark_window_days": 200000000, "recent_window_days": 28}"#,
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let at_cap = EngineConfig::from_json(r#"{"benchmark_window_days": 3650}"#);
        assert!(at_cap.is_ok());
    }

    #[test]
    fn test_window_starts() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let config = EngineConfig::default();
        assert_eq!(
            config.recent_window_start(today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 18).unwrap()
        );
        assert_eq!(
            config.benchmark_window_start(today).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 17).unwrap()
        );
    }

    #[test]
    fn test_unvalidated_window_is_an_error_not_a_panic() {
        let config = EngineConfig {
            benchmark_window_days: i64::MAX,
            recent_window_days: -5,
            ..EngineConfig::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert!(config.benchmark_window_start(today).is_err());
        assert!(config.recent_window_start(today).is_err());

        // in range for the cap but before chrono's earliest date
        let early = NaiveDate::MIN + Duration::days(10);
        assert!(matches!(
            EngineConfig::default().recent_window_start(early),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
