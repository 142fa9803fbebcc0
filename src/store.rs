//! Backing store
//!
//! [`HealthStore`] is the read/write contract every component runs against:
//! lookups by user and date, inclusive date-range scans, bulk delete by cohort
//! key, bulk insert, and upsert by (user, date). Writes are individually
//! atomic; nothing here wraps several calls in a transaction, so concurrent
//! writers resolve as last-writer-wins.
//!
//! [`MemoryStore`] keeps everything in memory and doubles as the JSON snapshot
//! format used by the CLI.

use crate::error::StoreError;
use crate::types::{BenchmarkAggregate, ComputedScore, CorrelationRecord, DailyLog, Profile};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Storage operations required by the engine
pub trait HealthStore {
    /// All logs for one user and date, in write order
    fn logs_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<DailyLog>, StoreError>;

    /// Logs with `from <= date <= to`, optionally for a single user, in write order
    fn logs_in_range(
        &self,
        user_id: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyLog>, StoreError>;

    /// Distinct dates with at least one log, most recent first
    fn log_dates_desc(&self, user_id: &str) -> Result<Vec<NaiveDate>, StoreError>;

    /// Users with at least one log on `date`
    fn users_with_logs_on(&self, date: NaiveDate) -> Result<Vec<String>, StoreError>;

    fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Profiles with onboarding complete
    fn onboarded_profiles(&self) -> Result<Vec<Profile>, StoreError>;

    fn computed_score(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, StoreError>;

    /// Insert or overwrite the row for (user, date).
    ///
    /// An existing `recommendation` is kept when the new row has none.
    fn upsert_computed_score(&mut self, score: ComputedScore) -> Result<(), StoreError>;

    fn benchmarks_for(&self, cohort_key: &str) -> Result<Vec<BenchmarkAggregate>, StoreError>;

    /// Remove every row for a cohort key, returning how many were removed
    fn delete_benchmarks(&mut self, cohort_key: &str) -> Result<usize, StoreError>;

    fn insert_benchmarks(&mut self, rows: Vec<BenchmarkAggregate>) -> Result<(), StoreError>;

    fn correlations_for(&self, user_id: &str) -> Result<Vec<CorrelationRecord>, StoreError>;
}

/// In-memory store, serializable as a JSON snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    pub profiles: Vec<Profile>,
    pub logs: Vec<DailyLog>,
    pub scores: Vec<ComputedScore>,
    pub benchmarks: Vec<BenchmarkAggregate>,
    pub correlations: Vec<CorrelationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a log; logs are never rewritten by the engine
    pub fn add_log(&mut self, log: DailyLog) {
        self.logs.push(log);
    }

    /// Insert or replace a profile by user id
    pub fn put_profile(&mut self, profile: Profile) {
        match self
            .profiles
            .iter_mut()
            .find(|p| p.user_id == profile.user_id)
        {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    pub fn add_correlation(&mut self, record: CorrelationRecord) {
        self.correlations.push(record);
    }

    /// Load a snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the snapshot to JSON
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl HealthStore for MemoryStore {
    fn logs_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Vec<DailyLog>, StoreError> {
        Ok(self
            .logs
            .iter()
            .filter(|log| log.user_id == user_id && log.date == date)
            .cloned()
            .collect())
    }

    fn logs_in_range(
        &self,
        user_id: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyLog>, StoreError> {
        Ok(self
            .logs
            .iter()
            .filter(|log| user_id.map_or(true, |id| log.user_id == id))
            .filter(|log| log.date >= from && log.date <= to)
            .cloned()
            .collect())
    }

    fn log_dates_desc(&self, user_id: &str) -> Result<Vec<NaiveDate>, StoreError> {
        let dates: BTreeSet<NaiveDate> = self
            .logs
            .iter()
            .filter(|log| log.user_id == user_id)
            .map(|log| log.date)
            .collect();
        Ok(dates.into_iter().rev().collect())
    }

    fn users_with_logs_on(&self, date: NaiveDate) -> Result<Vec<String>, StoreError> {
        let users: BTreeSet<&str> = self
            .logs
            .iter()
            .filter(|log| log.date == date)
            .map(|log| log.user_id.as_str())
            .collect();
        Ok(users.into_iter().map(str::to_string).collect())
    }

    fn profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    fn onboarded_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| p.onboarding_complete)
            .cloned()
            .collect())
    }

    fn computed_score(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, StoreError> {
        Ok(self
            .scores
            .iter()
            .find(|s| s.user_id == user_id && s.date == date)
            .cloned())
    }

    fn upsert_computed_score(&mut self, mut score: ComputedScore) -> Result<(), StoreError> {
        match self
            .scores
            .iter_mut()
            .find(|s| s.user_id == score.user_id && s.date == score.date)
        {
            Some(existing) => {
                if score.recommendation.is_none() {
                    score.recommendation = existing.recommendation.take();
                }
                *existing = score;
            }
            None => self.scores.push(score),
        }
        Ok(())
    }

    fn benchmarks_for(&self, cohort_key: &str) -> Result<Vec<BenchmarkAggregate>, StoreError> {
        Ok(self
            .benchmarks
            .iter()
            .filter(|row| row.cohort_key == cohort_key)
            .cloned()
            .collect())
    }

    fn delete_benchmarks(&mut self, cohort_key: &str) -> Result<usize, StoreError> {
        let before = self.benchmarks.len();
        self.benchmarks.retain(|row| row.cohort_key != cohort_key);
        Ok(before - self.benchmarks.len())
    }

    fn insert_benchmarks(&mut self, rows: Vec<BenchmarkAggregate>) -> Result<(), StoreError> {
        self.benchmarks.extend(rows);
        Ok(())
    }

    fn correlations_for(&self, user_id: &str) -> Result<Vec<CorrelationRecord>, StoreError> {
        Ok(self
            .correlations
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }
}
