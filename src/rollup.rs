//! Statistics rollup
//!
//! Merges a completed run into a user's aggregate snapshot. Rollup is purely
//! additive: every period bucket grows by the run's distance and minutes, and
//! the all-time top speed becomes the max of the two. No period-boundary resets
//! happen here.

use crate::types::{AggregateSnapshot, Period, RunRecord};

/// Pure snapshot merge
pub struct StatsRollup;

impl StatsRollup {
    /// Compute the snapshot that results from adding `completed` to `previous`.
    pub fn apply(previous: &AggregateSnapshot, completed: &RunRecord) -> AggregateSnapshot {
        let mut next = previous.clone();
        let distance = completed.distance_miles.max(0.0);
        let minutes = completed.duration_minutes();

        for period in Period::ALL {
            let totals = next.totals_mut(period);
            totals.miles += distance;
            totals.minutes += minutes;
        }

        next.fastest_speed_all_time = previous
            .fastest_speed_all_time
            .max(completed.top_speed_mph);
        next.last_run_id = Some(completed.id);

        next
    }

    /// Whether `snapshot` already contains `record`'s contribution
    pub fn already_applied(snapshot: &AggregateSnapshot, record: &RunRecord) -> bool {
        snapshot.last_run_id == Some(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PeriodTotals, RecordId};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record(distance: f64, duration_secs: u64, top_speed: f64) -> RunRecord {
        let saved_at = Utc.with_ymd_and_hms(2024, 9, 4, 9, 0, 0).unwrap();
        RunRecord {
            id: RecordId::new(),
            route: vec![],
            distance_miles: distance,
            top_speed_mph: top_speed,
            duration_secs,
            start_location: None,
            end_location: None,
            started_at: saved_at,
            saved_at,
        }
    }

    #[test]
    fn test_weekly_scenario() {
        let previous = AggregateSnapshot {
            weekly: PeriodTotals {
                miles: 10.0,
                minutes: 60.0,
            },
            fastest_speed_all_time: 8.0,
            ..Default::default()
        };

        let next = StatsRollup::apply(&previous, &record(5.0, 1800, 12.0));

        assert_eq!(
            next.weekly,
            PeriodTotals {
                miles: 15.0,
                minutes: 90.0
            }
        );
        assert_eq!(next.fastest_speed_all_time, 12.0);
    }

    #[test]
    fn test_every_bucket_receives_the_run() {
        let next = StatsRollup::apply(&AggregateSnapshot::default(), &record(2.5, 600, 30.0));

        for period in Period::ALL {
            assert_eq!(
                *next.totals(period),
                PeriodTotals {
                    miles: 2.5,
                    minutes: 10.0
                }
            );
        }
    }

    #[test]
    fn test_slower_run_keeps_fastest() {
        let previous = AggregateSnapshot {
            fastest_speed_all_time: 70.0,
            ..Default::default()
        };
        let next = StatsRollup::apply(&previous, &record(1.0, 60, 40.0));
        assert_eq!(next.fastest_speed_all_time, 70.0);
    }

    #[test]
    fn test_sequential_equals_combined() {
        let start = AggregateSnapshot {
            today: PeriodTotals {
                miles: 1.0,
                minutes: 5.0,
            },
            yearly: PeriodTotals {
                miles: 100.0,
                minutes: 900.0,
            },
            fastest_speed_all_time: 20.0,
            ..Default::default()
        };
        let a = record(3.25, 900, 35.0);
        let b = record(7.5, 2700, 28.0);

        let sequential = StatsRollup::apply(&StatsRollup::apply(&start, &a), &b);
        let combined = StatsRollup::apply(
            &start,
            &record(
                a.distance_miles + b.distance_miles,
                a.duration_secs + b.duration_secs,
                a.top_speed_mph.max(b.top_speed_mph),
            ),
        );

        for period in Period::ALL {
            let s = sequential.totals(period);
            let c = combined.totals(period);
            assert!((s.miles - c.miles).abs() < 1e-9);
            assert!((s.minutes - c.minutes).abs() < 1e-9);
        }
        assert_eq!(
            sequential.fastest_speed_all_time,
            combined.fastest_speed_all_time
        );
    }

    #[test]
    fn test_empty_run_only_marks_applied() {
        let previous = AggregateSnapshot::default();
        let empty = record(0.0, 0, 0.0);
        let next = StatsRollup::apply(&previous, &empty);

        assert_eq!(next.today, PeriodTotals::default());
        assert!(StatsRollup::already_applied(&next, &empty));
        assert!(!StatsRollup::already_applied(&previous, &empty));
        assert!(next.is_valid());
    }

    #[test]
    fn test_apply_does_not_touch_previous() {
        let previous = AggregateSnapshot::default();
        let _ = StatsRollup::apply(&previous, &record(4.0, 240, 9.0));
        assert_eq!(previous, AggregateSnapshot::default());
    }
}
