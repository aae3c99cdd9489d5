//! Time ranges and epoch-aligned chunk buckets.
//!
//! A chunk day is the number of days between 1970-01-01 and the first day
//! of the chunk's bucket. Buckets are `time_interval` days long and aligned
//! to the epoch, so `chunk_day % time_interval == 0` for every bucket.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tethys_identity::{CHUNK_DAY_MAX, CHUNK_DAY_MIN};

use crate::validation::{Rule, Violations};

const SECONDS_PER_DAY: i64 = 86_400;

/// An inclusive span of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First instant.
    #[serde(with = "crate::datetime")]
    pub from_date: DateTime<Utc>,
    /// Last instant.
    #[serde(with = "crate::datetime")]
    pub to_date: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range at second precision; the bounds are not checked.
    #[must_use]
    pub fn new(from_date: DateTime<Utc>, to_date: DateTime<Utc>) -> Self {
        Self {
            from_date: crate::datetime::truncate(from_date),
            to_date: crate::datetime::truncate(to_date),
        }
    }

    /// Returns `true` if `from_date <= to_date`.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.from_date <= self.to_date
    }

    /// Returns `true` if `other` lies entirely within this range.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.from_date <= other.from_date && other.to_date <= self.to_date
    }

    /// Returns `true` if `instant` lies within this range.
    #[must_use]
    pub fn contains_instant(&self, instant: &DateTime<Utc>) -> bool {
        self.from_date <= *instant && *instant <= self.to_date
    }

    /// Returns `true` if the ranges share at least one instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.from_date <= other.to_date && other.from_date <= self.to_date
    }

    /// The smallest range covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(
            self.from_date.min(other.from_date),
            self.to_date.max(other.to_date),
        )
    }

    pub(crate) fn check(&self, field: &str, violations: &mut Violations) {
        violations.ensure(
            self.is_ordered(),
            field,
            Rule::ReversedTimeRange,
            format!(
                "from_date {} is after to_date {}",
                crate::datetime::format(&self.from_date),
                crate::datetime::format(&self.to_date)
            ),
        );
    }
}

/// Returns `true` if `day` is within the representable chunk-day range.
#[must_use]
pub fn chunk_day_in_range(day: i64) -> bool {
    (i64::from(CHUNK_DAY_MIN)..=i64::from(CHUNK_DAY_MAX)).contains(&day)
}

/// Start day of the `time_interval`-day bucket containing `at`.
///
/// Returns `None` if `time_interval` is not positive or the bucket falls
/// outside the representable chunk-day range.
#[must_use]
pub fn chunk_day(at: &DateTime<Utc>, time_interval: i64) -> Option<i32> {
    if time_interval <= 0 {
        return None;
    }
    let day = at.timestamp().div_euclid(SECONDS_PER_DAY);
    let bucket = day - day.rem_euclid(time_interval);
    if !chunk_day_in_range(bucket) {
        return None;
    }
    i32::try_from(bucket).ok()
}

/// The time span covered by the bucket starting on `chunk_day`: from its
/// first instant through the last second before the next bucket.
///
/// Returns `None` if `time_interval` is not positive or the span is not
/// representable.
#[must_use]
pub fn chunk_window(chunk_day: i32, time_interval: i64) -> Option<TimeRange> {
    if time_interval <= 0 {
        return None;
    }
    let from_date = DateTime::<Utc>::UNIX_EPOCH
        .checked_add_signed(TimeDelta::try_days(i64::from(chunk_day))?)?;
    let to_date = from_date
        .checked_add_signed(TimeDelta::try_days(time_interval)?)?
        .checked_sub_signed(TimeDelta::seconds(1))?;
    Some(TimeRange::new(from_date, to_date))
}

/// Every bucket start day needed to cover `range`, in order.
///
/// Returns an empty list for a reversed range, a non-positive interval, or
/// a range reaching outside the representable chunk days.
#[must_use]
pub fn chunk_days(range: &TimeRange, time_interval: i64) -> Vec<i32> {
    if !range.is_ordered() {
        return Vec::new();
    }
    let (Some(first), Some(last)) = (
        chunk_day(&range.from_date, time_interval),
        chunk_day(&range.to_date, time_interval),
    ) else {
        return Vec::new();
    };

    let step = usize::try_from(time_interval).unwrap_or(usize::MAX);
    (i64::from(first)..=i64::from(last))
        .step_by(step)
        .filter_map(|day| i32::try_from(day).ok())
        .collect()
}
