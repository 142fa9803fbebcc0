//! Cohort benchmark aggregation
//!
//! Batch job that assigns every onboarded user to a cohort and publishes
//! per-symptom population statistics for each cohort large enough to pass the
//! minimum-size gate. Small cohorts fall back to their widened (stage + age)
//! cohort when that one is large enough, and are skipped otherwise.
//!
//! Each effective cohort key is rewritten as a unit: delete all rows for the
//! key, then insert the fresh set. Keys not recomputed in a run keep their old
//! rows.

use crate::cohort::{widen_key, CohortKey};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::normalizer::Normalizer;
use crate::percentile::{quartiles, round2};
use crate::store::HealthStore;
use crate::types::{BenchmarkAggregate, MergedDay, Profile};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A user's merged days, keyed by date
pub type DayHistory = BTreeMap<NaiveDate, MergedDay>;

/// Outcome of one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub run_id: Uuid,
    pub today: NaiveDate,
    /// Effective cohorts whose rows were replaced
    pub cohorts_processed: usize,
    pub errors: usize,
    /// Exact cohorts below the gate with no usable widened fallback
    pub cohorts_skipped: usize,
    /// Effective keys written this run, in processing order
    pub keys_written: Vec<String>,
    /// Set when the run aborted before any cohort was processed
    pub fatal: Option<String>,
}

impl AggregationReport {
    fn new(today: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            today,
            cohorts_processed: 0,
            errors: 0,
            cohorts_skipped: 0,
            keys_written: Vec::new(),
            fatal: None,
        }
    }

    fn abort(mut self, error: &EngineError) -> Self {
        warn!(run_id = %self.run_id, error = %error, "benchmark run aborted");
        self.errors = 1;
        self.fatal = Some(error.to_string());
        self
    }
}

/// A cohort member's history inside the benchmark window; `None` when the
/// member logged nothing
type Member<'a> = Option<&'a DayHistory>;

/// Aggregator for cohort benchmark rows
pub struct BenchmarkAggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> BenchmarkAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Recompute benchmarks as of `today`.
    ///
    /// Setup failures (profiles or logs unreadable) abort the run and are
    /// reported as a single error; per-cohort failures are counted and the run
    /// moves on.
    pub fn run<S: HealthStore + ?Sized>(&self, store: &mut S, today: NaiveDate) -> AggregationReport {
        let mut report = AggregationReport::new(today);
        info!(run_id = %report.run_id, %today, "benchmark run started");

        let profiles = match store.onboarded_profiles() {
            Ok(profiles) => profiles,
            Err(e) => return report.abort(&EngineError::from(e)),
        };
        if profiles.is_empty() {
            info!(run_id = %report.run_id, "no onboarded profiles");
            return report;
        }

        let bounds = self.config.benchmark_window_start(today).and_then(|window_start| {
            self.config
                .recent_window_start(today)
                .map(|recent_start| (window_start, recent_start))
        });
        let (window_start, recent_start) = match bounds {
            Ok(bounds) => bounds,
            Err(e) => return report.abort(&e),
        };
        let logs = match store.logs_in_range(None, window_start, today) {
            Ok(logs) => logs,
            Err(e) => return report.abort(&EngineError::from(e)),
        };
        let histories = Normalizer::merge_by_user(&logs);

        let mut exact: BTreeMap<String, Vec<Member<'_>>> = BTreeMap::new();
        let mut widened: BTreeMap<String, Vec<Member<'_>>> = BTreeMap::new();

        for profile in &profiles {
            let days = histories.get(&profile.user_id);
            let key = self.cohort_for(profile, days, recent_start, today);
            exact.entry(key.to_string()).or_default().push(days);
            widened
                .entry(key.widened().to_string())
                .or_default()
                .push(days);
        }

        let min_size = self.config.min_cohort_size;
        let mut processed: HashSet<String> = HashSet::new();

        for (exact_key, exact_members) in &exact {
            let (effective_key, members) = if exact_members.len() >= min_size {
                (exact_key.clone(), exact_members)
            } else {
                let widened_key = widen_key(exact_key).to_string();
                match widened.get(&widened_key) {
                    Some(wide) if wide.len() >= min_size => {
                        debug!(
                            exact = exact_key.as_str(),
                            widened = widened_key.as_str(),
                            exact_size = exact_members.len(),
                            widened_size = wide.len(),
                            "cohort below gate, using widened cohort"
                        );
                        (widened_key, wide)
                    }
                    _ => {
                        debug!(
                            exact = exact_key.as_str(),
                            size = exact_members.len(),
                            "cohort below gate, skipped"
                        );
                        report.cohorts_skipped += 1;
                        continue;
                    }
                }
            };

            if !processed.insert(effective_key.clone()) {
                continue;
            }

            let rows = compute_cohort_rows(&effective_key, members, recent_start, today);
            match replace_rows(store, &effective_key, rows) {
                Ok(written) => {
                    debug!(
                        key = effective_key.as_str(),
                        members = members.len(),
                        rows = written,
                        "cohort benchmarks replaced"
                    );
                    report.cohorts_processed += 1;
                    report.keys_written.push(effective_key);
                }
                Err(e) => {
                    warn!(key = effective_key.as_str(), error = %e, "cohort benchmark failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            run_id = %report.run_id,
            cohorts = report.cohorts_processed,
            skipped = report.cohorts_skipped,
            errors = report.errors,
            "benchmark run finished"
        );
        report
    }

    /// First date of the recent window ending at `today`
    pub fn recent_start(&self, today: NaiveDate) -> Result<NaiveDate, EngineError> {
        self.config.recent_window_start(today)
    }

    /// Exact cohort for a profile from its merged history
    pub fn cohort_for(
        &self,
        profile: &Profile,
        days: Option<&DayHistory>,
        recent_start: NaiveDate,
        today: NaiveDate,
    ) -> CohortKey {
        let average = recent_average_severity(days, recent_start, today)
            .unwrap_or(self.config.default_average_severity);
        CohortKey::build(
            profile.life_stage.as_deref(),
            profile.date_of_birth.as_deref(),
            average,
            today,
        )
    }
}

/// Mean severity over every (day, symptom) in `[from, to]`, or `None` when
/// nothing was logged
pub fn recent_average_severity(
    days: Option<&DayHistory>,
    from: NaiveDate,
    to: NaiveDate,
) -> Option<f64> {
    let (count, total) = days
        .into_iter()
        .flat_map(|history| history.range(from..=to))
        .flat_map(|(_, day)| day.symptoms.symptoms.values())
        .fold((0usize, 0.0), |(n, sum), severity| (n + 1, sum + severity));
    (count > 0).then(|| total / count as f64)
}

/// Days in `[from, to]` on which `symptom` was logged, and the mean of those
/// days' (max) severities
pub fn symptom_frequency(
    days: Option<&DayHistory>,
    symptom: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> (u32, Option<f64>) {
    let (count, total) = days
        .into_iter()
        .flat_map(|history| history.range(from..=to))
        .filter_map(|(_, day)| day.symptoms.symptoms.get(symptom))
        .fold((0u32, 0.0), |(n, sum), severity| (n + 1, sum + severity));
    (count, (count > 0).then(|| total / f64::from(count)))
}

fn compute_cohort_rows(
    cohort_key: &str,
    members: &[Member<'_>],
    recent_start: NaiveDate,
    today: NaiveDate,
) -> Vec<BenchmarkAggregate> {
    let symptoms: BTreeSet<&str> = members
        .iter()
        .flatten()
        .flat_map(|history| history.values())
        .flat_map(|day| day.symptoms.symptoms.keys().map(String::as_str))
        .collect();

    let size = members.len();
    if size == 0 {
        return Vec::new();
    }

    symptoms
        .into_iter()
        .map(|symptom| {
            let mut frequencies = Vec::with_capacity(size);
            let mut logger_severities = Vec::new();

            for &member in members {
                let (frequency, severity) = symptom_frequency(member, symptom, recent_start, today);
                frequencies.push(f64::from(frequency));
                if let Some(severity) = severity {
                    logger_severities.push(severity);
                }
            }

            let (p25, p50, p75) = quartiles(&frequencies);
            let avg_severity = if logger_severities.is_empty() {
                0.0
            } else {
                logger_severities.iter().sum::<f64>() / logger_severities.len() as f64
            };

            BenchmarkAggregate {
                cohort_key: cohort_key.to_string(),
                symptom: symptom.to_string(),
                prevalence_pct: round2(logger_severities.len() as f64 / size as f64 * 100.0),
                avg_frequency: round2(frequencies.iter().sum::<f64>() / size as f64),
                avg_severity: round2(avg_severity),
                frequency_p25: round2(p25),
                frequency_p50: round2(p50),
                frequency_p75: round2(p75),
                sample_size: size as u32,
            }
        })
        .collect()
}

fn replace_rows<S: HealthStore + ?Sized>(
    store: &mut S,
    cohort_key: &str,
    rows: Vec<BenchmarkAggregate>,
) -> Result<usize, EngineError> {
    store.delete_benchmarks(cohort_key)?;
    let written = rows.len();
    if written > 0 {
        store.insert_benchmarks(rows)?;
    }
    Ok(written)
}
