//! Personal readiness scoring
//!
//! Merges a user's logs for one day, derives the readiness sub-scores, counts
//! the logging streak, and upserts one [`ComputedScore`] per (user, date).
//! Recomputing with unchanged logs writes identical values.

use crate::error::EngineError;
use crate::features::FeatureDeriver;
use crate::normalizer::Normalizer;
use crate::store::HealthStore;
use crate::types::ComputedScore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome counts of a batch scoring run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub date: NaiveDate,
    pub scored: usize,
    /// Users listed for the date whose logs were gone by the time they were
    /// scored, e.g. deleted between the listing and the read
    pub skipped: usize,
    pub errors: usize,
}

/// Scorer for the per-user, per-day readiness row
pub struct ReadinessScorer;

impl ReadinessScorer {
    /// Compute and store the score for (user, date).
    ///
    /// Returns `Ok(None)` without writing when the user has no logs that day.
    pub fn score_day<S: HealthStore + ?Sized>(
        store: &mut S,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, EngineError> {
        let logs = store.logs_for_day(user_id, date)?;
        let Some(day) = Normalizer::merge_day(&logs) else {
            debug!(user_id, %date, "no logs, nothing to score");
            return Ok(None);
        };

        let features = FeatureDeriver::derive(&day);
        let streak = compute_streak(&store.log_dates_desc(user_id)?);

        let score = ComputedScore {
            user_id: user_id.to_string(),
            date,
            readiness: features.readiness(),
            components: features.components(),
            streak,
            recommendation: None,
        };

        store.upsert_computed_score(score.clone())?;
        debug!(
            user_id,
            %date,
            readiness = score.readiness,
            streak,
            logs = day.log_count,
            "readiness scored"
        );

        // Return what is stored, including any narrative already attached
        Ok(Some(store.computed_score(user_id, date)?.unwrap_or(score)))
    }

    /// Stored row if present, otherwise compute it (write-through)
    pub fn read_or_compute<S: HealthStore + ?Sized>(
        store: &mut S,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ComputedScore>, EngineError> {
        if let Some(existing) = store.computed_score(user_id, date)? {
            return Ok(Some(existing));
        }
        Self::score_day(store, user_id, date)
    }

    /// Score every user with a log on `date`, continuing past failures.
    ///
    /// Only a failure to list the users is returned as an error.
    pub fn score_all<S: HealthStore + ?Sized>(
        store: &mut S,
        date: NaiveDate,
    ) -> Result<BatchReport, EngineError> {
        let users = store.users_with_logs_on(date)?;

        let report = users.iter().fold(
            BatchReport {
                date,
                scored: 0,
                skipped: 0,
                errors: 0,
            },
            |mut report, user_id| {
                match Self::score_day(store, user_id, date) {
                    Ok(Some(_)) => report.scored += 1,
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        warn!(user_id = user_id.as_str(), %date, error = %e, "scoring failed");
                        report.errors += 1;
                    }
                }
                report
            },
        );

        info!(
            %date,
            scored = report.scored,
            skipped = report.skipped,
            errors = report.errors,
            "batch scoring finished"
        );
        Ok(report)
    }
}

/// Consecutive-day run anchored at the most recent date.
///
/// `dates_desc` must be sorted most recent first; repeated dates are ignored.
pub fn compute_streak(dates_desc: &[NaiveDate]) -> u32 {
    let mut iter = dates_desc.iter();
    let Some(mut previous) = iter.next().copied() else {
        return 0;
    };

    let mut streak = 1;
    for &date in iter {
        if date == previous {
            continue;
        }
        if previous.pred_opt() != Some(date) {
            break;
        }
        streak += 1;
        previous = date;
    }
    streak
}
