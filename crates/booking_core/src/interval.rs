//! crates/booking_core/src/interval.rs
//!
//! Half-open `[start, end)` time ranges and the overlap predicate.
//!
//! `Interval::overlaps` is the only collision rule in the crate: two intervals
//! collide iff `a.start < b.end && b.start < a.end`, so back-to-back sessions
//! (09:00-10:00 then 10:00-11:00) do not collide.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Builds an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::InvalidInput(format!(
                "end time {} must be after start time {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds `[start, start + minutes)`. Durations that leave chrono's range
    /// are rejected like non-positive ones.
    pub fn from_duration(start: DateTime<Utc>, minutes: i64) -> Result<Self, BookingError> {
        if minutes <= 0 {
            return Err(BookingError::InvalidInput(format!(
                "duration must be positive, got {} minutes",
                minutes
            )));
        }
        let end = Duration::try_minutes(minutes)
            .and_then(|d| start.checked_add_signed(d))
            .ok_or_else(|| {
                BookingError::InvalidInput(format!(
                    "a {} minute session starting at {} is out of range",
                    minutes, start
                ))
            })?;
        Ok(Self { start, end })
    }

    /// For values already validated elsewhere (rows read back from storage).
    pub(crate) fn unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The UTC calendar day `[00:00, next 00:00)`. The last representable day
    /// ends at `DateTime::<Utc>::MAX_UTC`.
    pub fn utc_day(date: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let end = start
            .checked_add_signed(Duration::days(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Exclusive-boundary overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(self, other, false)
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Decides whether two intervals overlap.
///
/// With `inclusive = false` touching endpoints do not count. `inclusive = true`
/// treats a shared endpoint as an overlap and is only offered for callers that
/// want "adjacent" detection; collision checks always use the exclusive form.
pub fn overlaps(a: &Interval, b: &Interval, inclusive: bool) -> bool {
    if inclusive {
        a.start <= b.end && b.start <= a.end
    } else {
        a.start < b.end && b.start < a.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn range(sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
        Interval::new(at(sh, sm), at(eh, em)).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(matches!(
            Interval::new(at(10, 0), at(10, 0)),
            Err(BookingError::InvalidInput(_))
        ));
        assert!(matches!(
            Interval::new(at(11, 0), at(10, 0)),
            Err(BookingError::InvalidInput(_))
        ));
        assert!(matches!(
            Interval::from_duration(at(10, 0), 0),
            Err(BookingError::InvalidInput(_))
        ));
    }

    #[test]
    fn from_duration_computes_end() {
        let slot = Interval::from_duration(at(9, 30), 90).unwrap();
        assert_eq!(slot.end, at(11, 0));
        assert_eq!(slot.duration_minutes(), 90);
    }

    #[test]
    fn out_of_range_durations_are_invalid_input() {
        for minutes in [i64::MAX / 2, i64::MAX, 1_000_000_000_000] {
            assert!(matches!(
                Interval::from_duration(at(9, 0), minutes),
                Err(BookingError::InvalidInput(_))
            ));
        }
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::minutes(30);
        assert!(Interval::from_duration(near_end, 60).is_err());
    }

    #[test]
    fn last_representable_day_is_clamped() {
        let day = Interval::utc_day(NaiveDate::MAX);
        assert_eq!(day.end, DateTime::<Utc>::MAX_UTC);
        assert!(day.start < day.end);
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        let morning = range(9, 0, 10, 0);
        let next = range(10, 0, 11, 0);
        assert!(!morning.overlaps(&next));
        assert!(!next.overlaps(&morning));
        assert!(overlaps(&morning, &next, true));
    }

    #[test]
    fn partial_and_nested_ranges_overlap() {
        let booking = range(10, 0, 11, 0);
        assert!(range(9, 30, 10, 30).overlaps(&booking));
        assert!(range(10, 30, 11, 30).overlaps(&booking));
        assert!(range(10, 15, 10, 45).overlaps(&booking));
        assert!(range(9, 0, 12, 0).overlaps(&booking));
        assert!(!range(11, 0, 12, 0).overlaps(&booking));
    }

    #[test]
    fn containment_includes_exact_bounds() {
        let window = range(9, 0, 12, 0);
        assert!(window.contains(&range(9, 0, 12, 0)));
        assert!(window.contains(&range(11, 0, 12, 0)));
        assert!(!window.contains(&range(11, 30, 12, 30)));
        assert!(!window.contains(&range(8, 30, 9, 30)));
    }
}
