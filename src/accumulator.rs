//! Per-fix accumulation of live run metrics
//!
//! The accumulator is the only writer of a session's [`RunState`]. It is fed one
//! fix at a time, in emission order, by the tracker's single-owner queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo;
use crate::types::{Coordinate, PositionFix, RecordId, RunRecord};

/// Mutable state of the in-progress session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Route in arrival order (append-only)
    pub route: Vec<Coordinate>,
    /// Speed at the latest fix (mph)
    pub current_speed: f64,
    /// Highest speed seen this session (mph)
    pub top_speed: f64,
    /// Distance covered so far (miles)
    pub distance: f64,
    /// Seconds counted by the session timer
    pub elapsed_secs: u64,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            route: Vec::new(),
            current_speed: 0.0,
            top_speed: 0.0,
            distance: 0.0,
            elapsed_secs: 0,
            started_at,
        }
    }

    /// Snapshot this state into an immutable record.
    ///
    /// Start and end locations are the first and last route points, or `None`
    /// for an empty route.
    pub fn to_record(&self, id: RecordId, saved_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            id,
            route: self.route.clone(),
            distance_miles: self.distance,
            top_speed_mph: self.top_speed,
            duration_secs: self.elapsed_secs,
            start_location: self.route.first().copied(),
            end_location: self.route.last().copied(),
            started_at: self.started_at,
            saved_at,
        }
    }

    pub fn live_stats(&self) -> LiveStats {
        LiveStats {
            current_speed_mph: self.current_speed,
            top_speed_mph: self.top_speed,
            distance_miles: self.distance,
            elapsed_secs: self.elapsed_secs,
            route_points: self.route.len(),
        }
    }
}

/// Figures shown on the tracking screen while a session runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    pub current_speed_mph: f64,
    pub top_speed_mph: f64,
    pub distance_miles: f64,
    pub elapsed_secs: u64,
    pub route_points: usize,
}

/// Folds position fixes into a [`RunState`]
#[derive(Debug, Clone)]
pub struct RunAccumulator {
    state: RunState,
}

impl RunAccumulator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: RunState::new(started_at),
        }
    }

    /// Apply one fix: speed, top speed, distance from the previous point, then route.
    pub fn on_fix(&mut self, fix: &PositionFix) -> LiveStats {
        let state = &mut self.state;

        state.current_speed = geo::mps_to_mph(fix.speed_mps);
        state.top_speed = state.top_speed.max(state.current_speed);

        let point = fix.coordinate();
        if let Some(previous) = state.route.last() {
            let leg = geo::haversine_miles(*previous, point);
            if leg.is_finite() {
                state.distance += leg;
            }
        }
        state.route.push(point);

        state.live_stats()
    }

    /// Record the timer's elapsed seconds
    pub fn set_elapsed(&mut self, elapsed_secs: u64) {
        self.state.elapsed_secs = elapsed_secs;
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 4, 8, 0, 0).unwrap()
    }

    fn fix(lat: f64, lng: f64, secs: i64, speed_mps: f64) -> PositionFix {
        PositionFix::new(lat, lng, t0() + chrono::Duration::seconds(secs), speed_mps)
    }

    #[test]
    fn test_no_fixes_means_no_distance() {
        let acc = RunAccumulator::new(t0());
        assert_eq!(acc.state().distance, 0.0);
        assert!(acc.state().route.is_empty());
    }

    #[test]
    fn test_first_fix_contributes_no_distance() {
        let mut acc = RunAccumulator::new(t0());
        let stats = acc.on_fix(&fix(37.0, -122.0, 0, 4.0));

        assert_eq!(stats.distance_miles, 0.0);
        assert_eq!(stats.route_points, 1);
        assert!((stats.current_speed_mph - 4.0 * geo::MPS_TO_MPH).abs() < 1e-9);
    }

    #[test]
    fn test_leg_distance_matches_great_circle() {
        let mut acc = RunAccumulator::new(t0());
        let a = fix(37.7749, -122.4194, 0, 10.0);
        let b = fix(37.7849, -122.4094, 60, 12.0);
        acc.on_fix(&a);
        acc.on_fix(&b);

        let expected = geo::haversine_miles(a.coordinate(), b.coordinate());
        assert!((acc.state().distance - expected).abs() < 1e-12);
        assert!(acc.state().distance > 0.0);
    }

    #[test]
    fn test_top_speed_never_decreases() {
        let mut acc = RunAccumulator::new(t0());
        let speeds = [3.0, 9.0, -1.0, 2.0, 9.5, -5.0, 0.0, 4.0];
        let mut last_top = 0.0;

        for (i, speed) in speeds.iter().enumerate() {
            let stats = acc.on_fix(&fix(37.0 + i as f64 * 0.001, -122.0, i as i64, *speed));
            assert!(stats.top_speed_mph >= last_top);
            assert!(stats.current_speed_mph >= 0.0);
            last_top = stats.top_speed_mph;
        }

        assert!((last_top - 9.5 * geo::MPS_TO_MPH).abs() < 1e-9);
    }

    #[test]
    fn test_negative_speed_clamped_to_zero() {
        let mut acc = RunAccumulator::new(t0());
        let stats = acc.on_fix(&fix(37.0, -122.0, 0, -1.0));
        assert_eq!(stats.current_speed_mph, 0.0);
        assert_eq!(stats.top_speed_mph, 0.0);
    }

    #[test]
    fn test_route_preserves_arrival_order() {
        let mut acc = RunAccumulator::new(t0());
        for i in 0..5 {
            acc.on_fix(&fix(10.0 + i as f64, 20.0, i, 1.0));
        }

        let lats: Vec<f64> = acc.state().route.iter().map(|c| c.latitude).collect();
        assert_eq!(lats, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_elapsed_is_independent_of_fix_timestamps() {
        let mut acc = RunAccumulator::new(t0());
        acc.on_fix(&fix(37.0, -122.0, 3600, 1.0));
        acc.set_elapsed(42);
        assert_eq!(acc.state().elapsed_secs, 42);
    }

    #[test]
    fn test_record_from_empty_state() {
        let state = RunState::new(t0());
        let record = state.to_record(RecordId::new(), t0());

        assert!(record.route.is_empty());
        assert_eq!(record.distance_miles, 0.0);
        assert_eq!(record.start_location, None);
        assert_eq!(record.end_location, None);
    }

    #[test]
    fn test_record_endpoints() {
        let mut acc = RunAccumulator::new(t0());
        acc.on_fix(&fix(1.0, 1.0, 0, 1.0));
        acc.on_fix(&fix(2.0, 2.0, 1, 1.0));
        acc.on_fix(&fix(3.0, 3.0, 2, 1.0));
        acc.set_elapsed(120);

        let record = acc.state().to_record(RecordId::new(), t0());
        assert_eq!(record.start_location, Some(Coordinate::new(1.0, 1.0)));
        assert_eq!(record.end_location, Some(Coordinate::new(3.0, 3.0)));
        assert_eq!(record.duration_secs, 120);
        assert_eq!(record.route.len(), 3);
    }
}
