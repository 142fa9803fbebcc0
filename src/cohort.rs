//! Cohort key derivation
//!
//! A cohort key joins three normalized parts with `_`:
//! life stage, age bucket and severity tier, e.g. `perimenopause_45-49_mild`.
//! The widened form drops the severity tier and is the only fallback
//! granularity.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between key components
pub const KEY_SEPARATOR: char = '_';

/// Normalized life stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeStage {
    Perimenopause,
    Menopause,
    Postmenopause,
    Unknown,
}

impl LifeStage {
    /// Normalize a free-text life stage label.
    ///
    /// The `post` prefix is checked first so "postmenopause" never lands in
    /// perimenopause.
    pub fn normalize(raw: &str) -> Self {
        let stage = raw.trim().to_lowercase();
        if stage.starts_with("post") {
            LifeStage::Postmenopause
        } else if stage.starts_with("peri") {
            LifeStage::Perimenopause
        } else if stage == "menopause" || stage == "meno" {
            LifeStage::Menopause
        } else {
            LifeStage::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifeStage::Perimenopause => "perimenopause",
            LifeStage::Menopause => "menopause",
            LifeStage::Postmenopause => "postmenopause",
            LifeStage::Unknown => "unknown",
        }
    }

    fn from_key_part(part: &str) -> Option<Self> {
        match part {
            "perimenopause" => Some(LifeStage::Perimenopause),
            "menopause" => Some(LifeStage::Menopause),
            "postmenopause" => Some(LifeStage::Postmenopause),
            "unknown" => Some(LifeStage::Unknown),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LifeStage::Perimenopause => "Perimenopause",
            LifeStage::Menopause => "Menopause",
            LifeStage::Postmenopause => "Postmenopause",
            LifeStage::Unknown => "Stage not specified",
        }
    }
}

/// Five-year age band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    Under40,
    From40To44,
    From45To49,
    From50To54,
    From55To59,
    Over60,
    Unknown,
}

impl AgeBucket {
    const ALL: [AgeBucket; 7] = [
        AgeBucket::Under40,
        AgeBucket::From40To44,
        AgeBucket::From45To49,
        AgeBucket::From50To54,
        AgeBucket::From55To59,
        AgeBucket::Over60,
        AgeBucket::Unknown,
    ];

    pub fn from_age(age: i32) -> Self {
        match age {
            i32::MIN..=-1 => AgeBucket::Unknown,
            0..=39 => AgeBucket::Under40,
            40..=44 => AgeBucket::From40To44,
            45..=49 => AgeBucket::From45To49,
            50..=54 => AgeBucket::From50To54,
            55..=59 => AgeBucket::From55To59,
            _ => AgeBucket::Over60,
        }
    }

    /// Bucket for a raw date of birth; missing or unparseable dates are unknown
    pub fn from_date_of_birth(raw: Option<&str>, today: NaiveDate) -> Self {
        raw.and_then(parse_date_of_birth)
            .and_then(|dob| age_on(dob, today))
            .map(AgeBucket::from_age)
            .unwrap_or(AgeBucket::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBucket::Under40 => "under_40",
            AgeBucket::From40To44 => "40-44",
            AgeBucket::From45To49 => "45-49",
            AgeBucket::From50To54 => "50-54",
            AgeBucket::From55To59 => "55-59",
            AgeBucket::Over60 => "60_plus",
            AgeBucket::Unknown => "unknown_age",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AgeBucket::Under40 => "under 40",
            AgeBucket::From40To44 => "ages 40-44",
            AgeBucket::From45To49 => "ages 45-49",
            AgeBucket::From50To54 => "ages 50-54",
            AgeBucket::From55To59 => "ages 55-59",
            AgeBucket::Over60 => "ages 60+",
            AgeBucket::Unknown => "age not shared",
        }
    }
}

/// Symptom burden tier from a recent average severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Mild,
    Moderate,
    Severe,
}

impl SeverityTier {
    /// `< 1.5` mild, `1.5..=2.5` moderate, `> 2.5` severe.
    /// Non-finite input is treated as moderate.
    pub fn from_average(average: f64) -> Self {
        if !average.is_finite() {
            SeverityTier::Moderate
        } else if average < 1.5 {
            SeverityTier::Mild
        } else if average <= 2.5 {
            SeverityTier::Moderate
        } else {
            SeverityTier::Severe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Mild => "mild",
            SeverityTier::Moderate => "moderate",
            SeverityTier::Severe => "severe",
        }
    }

    fn from_key_part(part: &str) -> Option<Self> {
        match part {
            "mild" => Some(SeverityTier::Mild),
            "moderate" => Some(SeverityTier::Moderate),
            "severe" => Some(SeverityTier::Severe),
            _ => None,
        }
    }
}

/// Composite cohort identifier, exact (with tier) or widened (without)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CohortKey {
    pub stage: LifeStage,
    pub age: AgeBucket,
    pub tier: Option<SeverityTier>,
}

impl CohortKey {
    /// Derive the exact key for a user
    pub fn build(
        life_stage: Option<&str>,
        date_of_birth: Option<&str>,
        average_severity: f64,
        today: NaiveDate,
    ) -> Self {
        Self {
            stage: LifeStage::normalize(life_stage.unwrap_or_default()),
            age: AgeBucket::from_date_of_birth(date_of_birth, today),
            tier: Some(SeverityTier::from_average(average_severity)),
        }
    }

    /// Stage + age only
    pub fn widened(&self) -> Self {
        Self {
            tier: None,
            ..*self
        }
    }

    pub fn is_widened(&self) -> bool {
        self.tier.is_none()
    }

    /// Parse a key previously produced by `Display`
    pub fn parse(key: &str) -> Option<Self> {
        let (stage_part, rest) = key.split_once(KEY_SEPARATOR)?;
        let stage = LifeStage::from_key_part(stage_part)?;

        let (age_part, tier) = match rest.rsplit_once(KEY_SEPARATOR) {
            Some((head, tail)) => match SeverityTier::from_key_part(tail) {
                Some(tier) => (head, Some(tier)),
                None => (rest, None),
            },
            None => (rest, None),
        };

        let age = AgeBucket::ALL
            .iter()
            .copied()
            .find(|bucket| bucket.as_str() == age_part)?;

        Some(Self { stage, age, tier })
    }

    /// Human-readable cohort description
    pub fn label(&self) -> String {
        match self.tier {
            Some(tier) => format!(
                "{}, {}, {} symptoms",
                self.stage.label(),
                self.age.label(),
                tier.as_str()
            ),
            None => format!("{}, {}", self.stage.label(), self.age.label()),
        }
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stage.as_str(), KEY_SEPARATOR, self.age.as_str())?;
        if let Some(tier) = self.tier {
            write!(f, "{}{}", KEY_SEPARATOR, tier.as_str())?;
        }
        Ok(())
    }
}

/// String form of [`CohortKey::build`]
pub fn cohort_key(
    life_stage: Option<&str>,
    date_of_birth: Option<&str>,
    average_severity: f64,
    today: NaiveDate,
) -> String {
    CohortKey::build(life_stage, date_of_birth, average_severity, today).to_string()
}

/// Drop the last `_`-separated component (the severity tier) of a full key
pub fn widen_key(key: &str) -> &str {
    key.rsplit_once(KEY_SEPARATOR)
        .map(|(head, _)| head)
        .unwrap_or(key)
}

/// Calendar-accurate age in whole years; `None` for birth dates in the future
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Option<i32> {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    (age >= 0).then_some(age)
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp
fn parse_date_of_birth(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_stage_normalization() {
        assert_eq!(LifeStage::normalize("Post-menopausal"), LifeStage::Postmenopause);
        assert_eq!(LifeStage::normalize("postmenopause"), LifeStage::Postmenopause);
        assert_eq!(LifeStage::normalize("Perimenopause"), LifeStage::Perimenopause);
        assert_eq!(LifeStage::normalize("peri"), LifeStage::Perimenopause);
        assert_eq!(LifeStage::normalize("MENOPAUSE"), LifeStage::Menopause);
        assert_eq!(LifeStage::normalize("meno"), LifeStage::Menopause);
        assert_eq!(LifeStage::normalize("not sure"), LifeStage::Unknown);
        assert_eq!(LifeStage::normalize("menopausal"), LifeStage::Unknown);
        assert_eq!(LifeStage::normalize(""), LifeStage::Unknown);
    }

    #[test]
    fn test_age_respects_birthday_not_yet_reached() {
        let today = date(2024, 6, 15);
        assert_eq!(age_on(date(1977, 6, 15), today), Some(47));
        assert_eq!(age_on(date(1977, 6, 16), today), Some(46));
        assert_eq!(age_on(date(1977, 7, 1), today), Some(46));
        assert_eq!(age_on(date(2030, 1, 1), today), None);
    }

    #[test]
    fn test_age_buckets() {
        assert_eq!(AgeBucket::from_age(39), AgeBucket::Under40);
        assert_eq!(AgeBucket::from_age(40), AgeBucket::From40To44);
        assert_eq!(AgeBucket::from_age(49), AgeBucket::From45To49);
        assert_eq!(AgeBucket::from_age(54), AgeBucket::From50To54);
        assert_eq!(AgeBucket::from_age(59), AgeBucket::From55To59);
        assert_eq!(AgeBucket::from_age(60), AgeBucket::Over60);
        assert_eq!(
            AgeBucket::from_date_of_birth(Some("not a date"), date(2024, 1, 1)),
            AgeBucket::Unknown
        );
        assert_eq!(
            AgeBucket::from_date_of_birth(None, date(2024, 1, 1)),
            AgeBucket::Unknown
        );
        assert_eq!(
            AgeBucket::from_date_of_birth(Some("1970-03-02T00:00:00Z"), date(2024, 1, 1)),
            AgeBucket::From50To54
        );
    }

    #[test]
    fn test_severity_tier_boundaries() {
        assert_eq!(SeverityTier::from_average(1.49), SeverityTier::Mild);
        assert_eq!(SeverityTier::from_average(1.5), SeverityTier::Moderate);
        assert_eq!(SeverityTier::from_average(2.5), SeverityTier::Moderate);
        assert_eq!(SeverityTier::from_average(2.51), SeverityTier::Severe);
        assert_eq!(SeverityTier::from_average(f64::NAN), SeverityTier::Moderate);
    }

    #[test]
    fn test_key_for_forty_seven_year_old() {
        let key = cohort_key(
            Some("Perimenopause"),
            Some("1977-01-10"),
            1.2,
            date(2024, 6, 15),
        );
        assert_eq!(key, "perimenopause_45-49_mild");
        assert_eq!(widen_key(&key), "perimenopause_45-49");
    }

    #[test]
    fn test_widened_key_drops_last_segment() {
        let today = date(2024, 6, 15);
        let cases = [
            (Some("post"), Some("1960-01-01"), 3.0),
            (Some("menopause"), Some("1990-12-31"), 0.0),
            (None, None, 2.0),
            (Some("peri"), Some("garbage"), 1.7),
        ];
        for (stage, dob, severity) in cases {
            let key = CohortKey::build(stage, dob, severity, today);
            let full = key.to_string();
            assert_eq!(key.widened().to_string(), widen_key(&full));
            assert_eq!(full, cohort_key(stage, dob, severity, today));
        }
    }

    #[test]
    fn test_parse_round_trips_underscored_buckets() {
        for raw in [
            "postmenopause_60_plus_severe",
            "unknown_unknown_age_moderate",
            "perimenopause_under_40",
            "menopause_50-54",
        ] {
            let key = CohortKey::parse(raw).unwrap();
            assert_eq!(key.to_string(), raw);
        }
        assert!(CohortKey::parse("nonsense").is_none());
    }

    #[test]
    fn test_labels() {
        let key = CohortKey::parse("perimenopause_45-49_mild").unwrap();
        assert_eq!(key.label(), "Perimenopause, ages 45-49, mild symptoms");
        assert_eq!(key.widened().label(), "Perimenopause, ages 45-49");
    }
}
