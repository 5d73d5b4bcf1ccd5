//! Repository quality filtering.
//!
//! A rule chain that rejects low-signal repositories before persistence.
//! Rules are applied in order and the first match wins; the returned reason
//! is the log line. The thresholds are heuristics carried over from long
//! operation of the monitor; they live on a config struct rather than as
//! inline magic numbers.

use chrono::{DateTime, Duration, Utc};

use crate::models::RepoItem;

/// Repository names containing any of these tokens are treated as throwaway
/// or instructional projects.
pub const LOW_QUALITY_NAME_KEYWORDS: &[&str] = &[
    "example", "test", "demo", "sample", "temp", "tutorial", "starter",
];

/// Tunable thresholds for the repository quality rule chain.
#[derive(Debug, Clone)]
pub struct QualityThresholds {
    /// Minimum normalized README excerpt length, in characters
    pub min_readme_len: usize,

    /// Minimum description length, in characters
    pub min_description_len: usize,

    /// Age beyond which a repository must show recent pushes
    pub inactive_age_days: i64,

    /// Maximum days since last push for repositories past `inactive_age_days`
    pub inactive_push_days: i64,

    /// Age beyond which a same-hour create/update pair means abandonment
    pub abandoned_age_days: i64,

    /// Age beyond which the stars-per-day ratio applies
    pub low_popularity_age_days: i64,

    /// Star count below which the stars-per-day ratio applies
    pub low_popularity_star_floor: i64,

    /// Minimum stars accrued per day of age for old, low-star repositories
    pub min_stars_per_day: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_readme_len: 200,
            min_description_len: 10,
            inactive_age_days: 365,
            inactive_push_days: 180,
            abandoned_age_days: 30,
            low_popularity_age_days: 730,
            low_popularity_star_floor: 100,
            min_stars_per_day: 0.05,
        }
    }
}

/// Why a repository was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    ReadmeTooShort,
    DescriptionTooShort,
    LowQualityName(String),
    Inactive,
    AbandonedAfterCreation,
    LowRelativePopularity,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ReadmeTooShort => write!(f, "README too short"),
            RejectReason::DescriptionTooShort => write!(f, "description too short"),
            RejectReason::LowQualityName(kw) => {
                write!(f, "low-quality name (contains '{}')", kw)
            }
            RejectReason::Inactive => write!(f, "inactive"),
            RejectReason::AbandonedAfterCreation => write!(f, "abandoned after creation"),
            RejectReason::LowRelativePopularity => write!(f, "low relative popularity"),
        }
    }
}

/// Apply the rule chain to a candidate repository.
///
/// `now` is injected so tests can pin the clock. Returns the first matching
/// rejection, or `None` when the repository passes all rules.
pub fn evaluate(
    repo: &RepoItem,
    thresholds: &QualityThresholds,
    now: DateTime<Utc>,
) -> Option<RejectReason> {
    if repo.readme.chars().count() < thresholds.min_readme_len {
        return Some(RejectReason::ReadmeTooShort);
    }

    if repo.description.trim().chars().count() < thresholds.min_description_len {
        return Some(RejectReason::DescriptionTooShort);
    }

    let name = repo.name.to_lowercase();
    for kw in LOW_QUALITY_NAME_KEYWORDS {
        if name.contains(kw) {
            return Some(RejectReason::LowQualityName(kw.to_string()));
        }
    }

    let age = now - repo.created_at;
    let since_push = now - repo.updated_at;

    if age > Duration::days(thresholds.inactive_age_days)
        && since_push > Duration::days(thresholds.inactive_push_days)
    {
        return Some(RejectReason::Inactive);
    }

    if age > Duration::days(thresholds.abandoned_age_days)
        && (repo.updated_at - repo.created_at).abs() < Duration::hours(1)
    {
        return Some(RejectReason::AbandonedAfterCreation);
    }

    if age > Duration::days(thresholds.low_popularity_age_days)
        && repo.stars < thresholds.low_popularity_star_floor
    {
        let age_days = age.num_days().max(1) as f64;
        if (repo.stars as f64) / age_days < thresholds.min_stars_per_day {
            return Some(RejectReason::LowRelativePopularity);
        }
    }

    None
}
