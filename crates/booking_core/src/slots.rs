//! crates/booking_core/src/slots.rs
//!
//! Turns availability windows and existing bookings into bookable start times.
//!
//! Every window is walked independently from its own start in fixed 30 minute
//! steps, whatever the session length, so a 45 minute session can still only
//! start on the half hour relative to the window. Windows are neither merged
//! nor clipped: overlapping windows yield duplicate candidates unless the
//! caller opts into [`merge_windows`] or [`collapse_duplicates`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::interval::Interval;

/// Distance between consecutive candidate start times.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// One candidate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandidateSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub available: bool,
}

/// Produces every candidate start in window-then-time order, each flagged
/// `available` unless it overlaps a booking. Pure: no clock, no I/O.
pub fn get_viable_start_times(
    availability: &[Interval],
    bookings: &[Interval],
    duration_minutes: i64,
) -> Vec<CandidateSlot> {
    let Some(duration) = Duration::try_minutes(duration_minutes).filter(|d| *d > Duration::zero())
    else {
        return Vec::new();
    };
    let step = Duration::minutes(SLOT_STEP_MINUTES);

    // Stable sorts keep the caller's order for equal starts.
    let mut windows = availability.to_vec();
    windows.sort_by_key(|w| w.start);
    let mut booked = bookings.to_vec();
    booked.sort_by_key(|b| b.start);

    let mut candidates = Vec::new();
    for window in &windows {
        let mut pointer = window.start;
        // Stops once either step leaves chrono's range.
        while let Some(end) = pointer.checked_add_signed(duration) {
            if end > window.end {
                break;
            }
            let slot = Interval::unchecked(pointer, end);
            let blocked = booked
                .iter()
                .take_while(|b| b.start < slot.end)
                .any(|b| slot.overlaps(b));
            candidates.push(CandidateSlot {
                start_time: slot.start,
                end_time: slot.end,
                available: !blocked,
            });
            pointer = match pointer.checked_add_signed(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    candidates
}

/// Coalesces overlapping or touching windows into disjoint ones, ordered by start.
pub fn merge_windows(availability: &[Interval]) -> Vec<Interval> {
    let mut windows = availability.to_vec();
    windows.sort_by_key(|w| w.start);

    let mut merged: Vec<Interval> = Vec::with_capacity(windows.len());
    for window in windows {
        match merged.last_mut() {
            Some(last) if window.start <= last.end => {
                if window.end > last.end {
                    last.end = window.end;
                }
            }
            _ => merged.push(window),
        }
    }
    merged
}

/// Keeps one candidate per start instant, ordered by time. A start stays
/// available only if every duplicate of it was available.
pub fn collapse_duplicates(candidates: Vec<CandidateSlot>) -> Vec<CandidateSlot> {
    let mut sorted = candidates;
    sorted.sort_by_key(|c| c.start_time);

    let mut collapsed: Vec<CandidateSlot> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        match collapsed.last_mut() {
            Some(last) if last.start_time == candidate.start_time => {
                last.available &= candidate.available;
            }
            _ => collapsed.push(candidate),
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn range(sh: u32, sm: u32, eh: u32, em: u32) -> Interval {
        Interval::new(at(sh, sm), at(eh, em)).unwrap()
    }

    fn starts(slots: &[CandidateSlot]) -> Vec<(u32, u32, bool)> {
        use chrono::Timelike;
        slots
            .iter()
            .map(|s| (s.start_time.hour(), s.start_time.minute(), s.available))
            .collect()
    }

    #[test]
    fn empty_calendar_yields_half_hour_starts_that_fit() {
        let slots = get_viable_start_times(&[range(9, 0, 12, 0)], &[], 60);
        assert_eq!(
            starts(&slots),
            vec![
                (9, 0, true),
                (9, 30, true),
                (10, 0, true),
                (10, 30, true),
                (11, 0, true),
            ]
        );
        assert_eq!(slots.last().unwrap().end_time, at(12, 0));
    }

    #[test]
    fn booking_blocks_only_strictly_overlapping_candidates() {
        let slots = get_viable_start_times(&[range(9, 0, 12, 0)], &[range(10, 0, 11, 0)], 60);
        assert_eq!(
            starts(&slots),
            vec![
                (9, 0, true),
                (9, 30, false),
                (10, 0, false),
                (10, 30, false),
                (11, 0, true),
            ]
        );
    }

    #[test]
    fn step_is_independent_of_duration() {
        let slots = get_viable_start_times(&[range(9, 0, 11, 0)], &[], 45);
        assert_eq!(
            starts(&slots),
            vec![(9, 0, true), (9, 30, true), (10, 0, true)]
        );
    }

    #[test]
    fn short_window_and_bad_duration_produce_nothing() {
        assert!(get_viable_start_times(&[range(9, 0, 9, 45)], &[], 60).is_empty());
        assert!(get_viable_start_times(&[range(9, 0, 12, 0)], &[], 0).is_empty());
        assert!(get_viable_start_times(&[range(9, 0, 12, 0)], &[], -30).is_empty());
    }

    #[test]
    fn oversized_duration_produces_nothing() {
        let window = [range(9, 0, 12, 0)];
        assert!(get_viable_start_times(&window, &[], 1_000_000_000_000).is_empty());
        assert!(get_viable_start_times(&window, &[], i64::MAX).is_empty());
    }

    #[test]
    fn window_at_the_end_of_time_stops_cleanly() {
        let end = DateTime::<Utc>::MAX_UTC;
        let window = Interval::new(end - Duration::minutes(90), end).unwrap();
        let slots = get_viable_start_times(&[window], &[], 60);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].end_time, end);
    }

    #[test]
    fn booking_outside_every_window_suppresses_nothing() {
        let slots = get_viable_start_times(&[range(9, 0, 10, 0)], &[range(14, 0, 15, 0)], 30);
        assert!(slots.iter().all(|s| s.available));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn windows_are_processed_independently_and_in_start_order() {
        let afternoon = range(14, 0, 15, 0);
        let morning = range(9, 0, 10, 0);
        let overlapping = range(9, 30, 10, 30);
        let slots = get_viable_start_times(&[afternoon, overlapping, morning], &[], 60);
        assert_eq!(
            starts(&slots),
            vec![(9, 0, true), (9, 30, true), (14, 0, true)]
        );

        let duplicated = get_viable_start_times(&[range(9, 0, 11, 0), range(9, 0, 10, 0)], &[], 60);
        assert_eq!(
            starts(&duplicated),
            vec![(9, 0, true), (9, 30, true), (10, 0, true), (9, 0, true)]
        );
    }

    #[test]
    fn merge_windows_joins_overlapping_and_touching() {
        let merged = merge_windows(&[
            range(13, 0, 14, 0),
            range(9, 0, 10, 0),
            range(9, 30, 11, 0),
            range(11, 0, 11, 30),
        ]);
        assert_eq!(merged, vec![range(9, 0, 11, 30), range(13, 0, 14, 0)]);
    }

    #[test]
    fn collapse_duplicates_is_conservative() {
        let raw = vec![
            CandidateSlot {
                start_time: at(10, 0),
                end_time: at(11, 0),
                available: true,
            },
            CandidateSlot {
                start_time: at(9, 0),
                end_time: at(10, 0),
                available: true,
            },
            CandidateSlot {
                start_time: at(10, 0),
                end_time: at(11, 0),
                available: false,
            },
        ];
        assert_eq!(
            starts(&collapse_duplicates(raw)),
            vec![(9, 0, true), (10, 0, false)]
        );
    }

    //=====================================================================================
    // Properties
    //=====================================================================================

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
    }

    /// Disjoint windows laid out left to right, described as (gap, length) in minutes.
    fn disjoint_windows(shape: &[(i64, i64)]) -> Vec<Interval> {
        let mut cursor = base();
        shape
            .iter()
            .map(|(gap, len)| {
                let start = cursor + Duration::minutes(*gap);
                let end = start + Duration::minutes(*len);
                cursor = end;
                Interval::unchecked(start, end)
            })
            .collect()
    }

    proptest! {
        #[test]
        fn candidates_step_from_window_start_and_fit(
            shape in prop::collection::vec((0i64..240, 1i64..480), 1..5),
            duration in 15i64..180,
        ) {
            let windows = disjoint_windows(&shape);
            let slots = get_viable_start_times(&windows, &[], duration);

            let mut expected = Vec::new();
            for w in &windows {
                let mut k = 0;
                loop {
                    let start = w.start + Duration::minutes(k * SLOT_STEP_MINUTES);
                    if start + Duration::minutes(duration) > w.end {
                        break;
                    }
                    expected.push(start);
                    k += 1;
                }
            }
            let actual: Vec<_> = slots.iter().map(|s| s.start_time).collect();
            prop_assert_eq!(actual, expected);
            prop_assert!(slots.iter().all(|s| s.available));
            prop_assert!(slots
                .iter()
                .all(|s| s.end_time - s.start_time == Duration::minutes(duration)));
        }

        #[test]
        fn availability_flag_matches_exclusive_overlap(
            shape in prop::collection::vec((0i64..120, 30i64..360), 1..4),
            booking_offsets in prop::collection::vec((0i64..1200, 1i64..180), 0..6),
            duration in 15i64..120,
        ) {
            let windows = disjoint_windows(&shape);
            let bookings: Vec<Interval> = booking_offsets
                .iter()
                .map(|(offset, len)| {
                    let start = base() + Duration::minutes(*offset);
                    Interval::unchecked(start, start + Duration::minutes(*len))
                })
                .collect();

            for slot in get_viable_start_times(&windows, &bookings, duration) {
                let candidate = Interval::unchecked(slot.start_time, slot.end_time);
                let collides = bookings.iter().any(|b| {
                    candidate.start < b.end && b.start < candidate.end
                });
                prop_assert_eq!(slot.available, !collides);
            }
        }

        #[test]
        fn generation_is_deterministic(
            shape in prop::collection::vec((0i64..120, 30i64..360), 1..4),
            booking_offsets in prop::collection::vec((0i64..600, 1i64..120), 0..4),
            duration in 15i64..120,
        ) {
            let windows = disjoint_windows(&shape);
            let bookings: Vec<Interval> = booking_offsets
                .iter()
                .map(|(offset, len)| {
                    let start = base() + Duration::minutes(*offset);
                    Interval::unchecked(start, start + Duration::minutes(*len))
                })
                .collect();
            prop_assert_eq!(
                get_viable_start_times(&windows, &bookings, duration),
                get_viable_start_times(&windows, &bookings, duration)
            );
        }
    }
}
