//! Readiness feature derivation
//!
//! This module derives the four readiness sub-scores from a merged day:
//! - Sleep (hours, quality, disruptions)
//! - Mood
//! - Symptom load
//! - Stressor load
//!
//! and combines them into the composite readiness value.

use crate::normalizer::Normalizer;
use crate::types::{ComponentScores, MergedDay, SleepQuality};

/// Score used when an input signal is unknown
pub const NEUTRAL_SCORE: f64 = 50.0;

const SUB_SCORE_MIN: f64 = 10.0;
const SUB_SCORE_MAX: f64 = 100.0;
const READINESS_MIN: f64 = 5.0;
const READINESS_MAX: f64 = 99.0;

// Weights in percent (0.40 / 0.25 / 0.20 / 0.15) so the sum stays exact
const SLEEP_WEIGHT: f64 = 40.0;
const MOOD_WEIGHT: f64 = 25.0;
const SYMPTOM_WEIGHT: f64 = 20.0;
const STRESSOR_WEIGHT: f64 = 15.0;

/// Hours of sleep that earn the full base score
const TARGET_SLEEP_HOURS: f64 = 8.0;
const SLEEP_BASE_AT_TARGET: f64 = 85.0;
const DISRUPTION_PENALTY: f64 = 7.0;
const MAX_DISRUPTION_PENALTY: f64 = 20.0;

const SYMPTOM_COUNT_PENALTY: f64 = 10.0;
const SYMPTOM_SEVERITY_PENALTY: f64 = 3.0;
const STRESSOR_PENALTY: f64 = 12.0;

/// Unrounded sub-scores for one day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessFeatures {
    pub sleep: f64,
    pub mood: f64,
    pub symptom: f64,
    pub stressor: f64,
}

impl ReadinessFeatures {
    /// Weighted composite, rounded and clamped to 5-99
    pub fn readiness(&self) -> u8 {
        let weighted = self.sleep * SLEEP_WEIGHT
            + self.mood * MOOD_WEIGHT
            + self.symptom * SYMPTOM_WEIGHT
            + self.stressor * STRESSOR_WEIGHT;
        (weighted / 100.0).round().clamp(READINESS_MIN, READINESS_MAX) as u8
    }

    /// Sub-scores rounded for storage
    pub fn components(&self) -> ComponentScores {
        ComponentScores {
            sleep: as_stored(self.sleep),
            mood: as_stored(self.mood),
            symptom: as_stored(self.symptom),
            stressor: as_stored(self.stressor),
        }
    }
}

/// Feature deriver for computing readiness sub-scores
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive all four sub-scores from a merged day
    pub fn derive(day: &MergedDay) -> ReadinessFeatures {
        let stressor_count =
            day.symptoms.stressors.len() + Normalizer::triggered_stressor_tags(day).len();

        ReadinessFeatures {
            sleep: compute_sleep_score(day.sleep_hours, day.sleep_quality, day.disruptions),
            mood: compute_mood_score(day.mood),
            symptom: compute_symptom_score(day.symptoms.symptoms.values().copied()),
            stressor: compute_stressor_score(stressor_count),
        }
    }
}

/// Sleep score: hours against an 8h target, adjusted by quality and disruptions
pub fn compute_sleep_score(
    hours: Option<f64>,
    quality: Option<SleepQuality>,
    disruptions: Option<u32>,
) -> f64 {
    let Some(hours) = hours.filter(|h| h.is_finite()) else {
        return NEUTRAL_SCORE;
    };

    let base =
        (hours / TARGET_SLEEP_HOURS * SLEEP_BASE_AT_TARGET).clamp(SUB_SCORE_MIN, SUB_SCORE_MAX);

    let quality_adjustment = match quality {
        Some(SleepQuality::Great) => 15.0,
        Some(SleepQuality::Good) => 5.0,
        Some(SleepQuality::Poor) => -15.0,
        Some(SleepQuality::Terrible) => -25.0,
        None => 0.0,
    };

    let disruption_penalty =
        (disruptions.unwrap_or(0) as f64 * DISRUPTION_PENALTY).min(MAX_DISRUPTION_PENALTY);

    (base + quality_adjustment - disruption_penalty).clamp(SUB_SCORE_MIN, SUB_SCORE_MAX)
}

/// Mood score: 1-5 mapped onto 20-100
pub fn compute_mood_score(mood: Option<u8>) -> f64 {
    match mood {
        Some(mood) => f64::from(mood.clamp(1, 5)) * 20.0,
        None => NEUTRAL_SCORE,
    }
}

/// Symptom score from the severities of non-stressor symptoms
pub fn compute_symptom_score(severities: impl Iterator<Item = f64>) -> f64 {
    let (count, total) = severities.fold((0usize, 0.0), |(n, sum), s| (n + 1, sum + s));
    if count == 0 {
        return SUB_SCORE_MAX;
    }
    let average = total / count as f64;
    (SUB_SCORE_MAX - count as f64 * SYMPTOM_COUNT_PENALTY - average * SYMPTOM_SEVERITY_PENALTY)
        .clamp(SUB_SCORE_MIN, SUB_SCORE_MAX)
}

/// Stressor score from flagged entries plus triggered context tags
pub fn compute_stressor_score(stressor_count: usize) -> f64 {
    if stressor_count == 0 {
        return SUB_SCORE_MAX;
    }
    (SUB_SCORE_MAX - stressor_count as f64 * STRESSOR_PENALTY).clamp(SUB_SCORE_MIN, SUB_SCORE_MAX)
}

fn as_stored(score: f64) -> u8 {
    score.round().clamp(SUB_SCORE_MIN, SUB_SCORE_MAX) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizedSymptoms;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn empty_day() -> MergedDay {
        MergedDay {
            user_id: "u1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            sleep_hours: None,
            sleep_quality: None,
            disruptions: None,
            mood: None,
            symptoms: NormalizedSymptoms::default(),
            context_tags: BTreeSet::new(),
            log_count: 1,
        }
    }

    #[test]
    fn test_all_missing_defaults() {
        let features = FeatureDeriver::derive(&empty_day());
        assert_eq!(features.sleep, 50.0);
        assert_eq!(features.mood, 50.0);
        assert_eq!(features.symptom, 100.0);
        assert_eq!(features.stressor, 100.0);
        // 20 + 12.5 + 20 + 15 = 67.5, rounded half up
        assert_eq!(features.readiness(), 68);
    }

    #[test]
    fn test_sleep_score() {
        // 8h great sleep: 85 + 15
        assert_eq!(compute_sleep_score(Some(8.0), Some(SleepQuality::Great), None), 100.0);
        // 6h: 63.75 + 5 - 14
        let score = compute_sleep_score(Some(6.0), Some(SleepQuality::Good), Some(2));
        assert!((score - 54.75).abs() < 1e-9);
        // disruption penalty caps at 20
        let score = compute_sleep_score(Some(8.0), None, Some(10));
        assert!((score - 65.0).abs() < 1e-9);
        // floor
        assert_eq!(compute_sleep_score(Some(0.0), Some(SleepQuality::Terrible), Some(5)), 10.0);
        // long sleep caps base at 100
        assert_eq!(compute_sleep_score(Some(14.0), Some(SleepQuality::Great), None), 100.0);
    }

    #[test]
    fn test_mood_score() {
        assert_eq!(compute_mood_score(Some(1)), 20.0);
        assert_eq!(compute_mood_score(Some(5)), 100.0);
        assert_eq!(compute_mood_score(None), 50.0);
    }

    #[test]
    fn test_symptom_score() {
        assert_eq!(compute_symptom_score(std::iter::empty()), 100.0);
        // 2 symptoms averaging 3: 100 - 20 - 9
        assert_eq!(compute_symptom_score([2.0, 4.0].into_iter()), 71.0);
        assert_eq!(compute_symptom_score([5.0; 12].into_iter()), 10.0);
    }

    #[test]
    fn test_stressor_score() {
        assert_eq!(compute_stressor_score(0), 100.0);
        assert_eq!(compute_stressor_score(2), 76.0);
        assert_eq!(compute_stressor_score(10), 10.0);
    }

    #[test]
    fn test_stressors_count_flags_and_tags() {
        let mut day = empty_day();
        day.symptoms.stressors.insert("work".to_string(), 2.0);
        day.context_tags.insert("travel".to_string());
        day.context_tags.insert("alcohol".to_string());
        day.context_tags.insert("yoga".to_string());

        let features = FeatureDeriver::derive(&day);
        assert_eq!(features.stressor, 100.0 - 3.0 * 12.0);
        // stressor entries are not symptoms
        assert_eq!(features.symptom, 100.0);
    }

    #[test]
    fn test_readiness_bounds() {
        let worst = ReadinessFeatures {
            sleep: 10.0,
            mood: 10.0,
            symptom: 10.0,
            stressor: 10.0,
        };
        assert_eq!(worst.readiness(), 10);

        let best = ReadinessFeatures {
            sleep: 100.0,
            mood: 100.0,
            symptom: 100.0,
            stressor: 100.0,
        };
        assert_eq!(best.readiness(), 99);
    }
}
