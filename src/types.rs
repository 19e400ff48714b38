//! Core types for the Ghost tracking pipeline
//!
//! This module defines the values that flow through each stage: raw position
//! fixes from the sampler, finished run records, and the per-user aggregate
//! snapshot that rollup merges runs into.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GhostError;

/// Identity of a user in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(uid: &str) -> Self {
        Self::new(uid)
    }
}

impl From<String> for UserId {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

/// Identifier of a saved run, assigned once when the run is finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Id for a record stored under `key`. Keys that are not UUIDs (runs
    /// saved by older clients under generated push keys) map to a stable
    /// name-based UUID.
    pub fn from_key(key: &str) -> Self {
        Uuid::parse_str(key)
            .map(Self)
            .unwrap_or_else(|_| Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = GhostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| GhostError::InvalidInput(format!("record id {s:?}: {e}")))
    }
}

/// A point on the route, stored as `{lat, lng}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One position sample reported by the location provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// When the provider took the sample (UTC)
    pub timestamp: DateTime<Utc>,
    /// Instantaneous speed in meters/second; negative when the provider does not know it
    #[serde(default = "unknown_speed")]
    pub speed_mps: f64,
}

fn unknown_speed() -> f64 {
    -1.0
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>, speed_mps: f64) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
            speed_mps,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A completed, saved session. Never mutated after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub id: RecordId,
    #[serde(default)]
    pub route: Vec<Coordinate>,
    /// Total distance (miles)
    #[serde(rename = "distance")]
    pub distance_miles: f64,
    /// Highest observed speed (mph)
    #[serde(rename = "topSpeed")]
    pub top_speed_mph: f64,
    /// Elapsed session time (seconds)
    #[serde(rename = "duration", default)]
    pub duration_secs: u64,
    pub start_location: Option<Coordinate>,
    pub end_location: Option<Coordinate>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "date", with = "chrono::serde::ts_seconds")]
    pub saved_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs as f64 / 60.0
    }
}

/// Rolling statistics periods shown on the profile screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Week,
    Month,
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Today, Period::Week, Period::Month, Period::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
        }
    }
}

impl FromStr for Period {
    type Err = GhostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "today" | "day" => Ok(Period::Today),
            "week" | "weekly" => Ok(Period::Week),
            "month" | "monthly" => Ok(Period::Month),
            "year" | "yearly" => Ok(Period::Year),
            other => Err(GhostError::InvalidInput(format!("unknown period: {other}"))),
        }
    }
}

/// Cumulative totals for one period bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub miles: f64,
    pub minutes: f64,
}

/// A user's cumulative statistics at a point in time
///
/// Serialized with the flat key layout used by the user document
/// (`today_mileage`, `weekly_minutes`, `fastest_all_time_speed`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotDocument", into = "SnapshotDocument")]
pub struct AggregateSnapshot {
    pub today: PeriodTotals,
    pub weekly: PeriodTotals,
    pub monthly: PeriodTotals,
    pub yearly: PeriodTotals,
    /// Highest speed ever recorded (mph); never decreases
    pub fastest_speed_all_time: f64,
    /// Last run merged into this snapshot, used to recognise retried commits
    pub last_run_id: Option<RecordId>,
}

impl AggregateSnapshot {
    pub fn totals(&self, period: Period) -> &PeriodTotals {
        match period {
            Period::Today => &self.today,
            Period::Week => &self.weekly,
            Period::Month => &self.monthly,
            Period::Year => &self.yearly,
        }
    }

    pub fn totals_mut(&mut self, period: Period) -> &mut PeriodTotals {
        match period {
            Period::Today => &mut self.today,
            Period::Week => &mut self.weekly,
            Period::Month => &mut self.monthly,
            Period::Year => &mut self.yearly,
        }
    }

    /// Profile-screen view of a single period
    pub fn view(&self, period: Period) -> PeriodView {
        let totals = self.totals(period);
        PeriodView {
            period,
            miles: totals.miles,
            minutes: totals.minutes,
            fastest_speed: self.fastest_speed_all_time,
        }
    }

    /// No counter is negative or NaN
    pub fn is_valid(&self) -> bool {
        Period::ALL.iter().all(|p| {
            let t = self.totals(*p);
            t.miles >= 0.0 && t.minutes >= 0.0
        }) && self.fastest_speed_all_time >= 0.0
    }
}

/// Statistics for one period as presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodView {
    pub period: Period,
    pub miles: f64,
    pub minutes: f64,
    pub fastest_speed: f64,
}

/// Wire form of the snapshot inside `users/{uid}`. Missing keys read as zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    today_mileage: f64,
    #[serde(default)]
    today_minutes: f64,
    #[serde(default)]
    weekly_mileage: f64,
    #[serde(default)]
    weekly_minutes: f64,
    #[serde(default)]
    monthly_mileage: f64,
    #[serde(default)]
    monthly_minutes: f64,
    #[serde(default)]
    yearly_mileage: f64,
    #[serde(default)]
    yearly_minutes: f64,
    #[serde(default)]
    fastest_all_time_speed: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_run_id: Option<RecordId>,
}

impl From<SnapshotDocument> for AggregateSnapshot {
    fn from(doc: SnapshotDocument) -> Self {
        Self {
            today: PeriodTotals {
                miles: doc.today_mileage,
                minutes: doc.today_minutes,
            },
            weekly: PeriodTotals {
                miles: doc.weekly_mileage,
                minutes: doc.weekly_minutes,
            },
            monthly: PeriodTotals {
                miles: doc.monthly_mileage,
                minutes: doc.monthly_minutes,
            },
            yearly: PeriodTotals {
                miles: doc.yearly_mileage,
                minutes: doc.yearly_minutes,
            },
            fastest_speed_all_time: doc.fastest_all_time_speed,
            last_run_id: doc.last_run_id,
        }
    }
}

impl From<AggregateSnapshot> for SnapshotDocument {
    fn from(snapshot: AggregateSnapshot) -> Self {
        Self {
            today_mileage: snapshot.today.miles,
            today_minutes: snapshot.today.minutes,
            weekly_mileage: snapshot.weekly.miles,
            weekly_minutes: snapshot.weekly.minutes,
            monthly_mileage: snapshot.monthly.miles,
            monthly_minutes: snapshot.monthly.minutes,
            yearly_mileage: snapshot.yearly.miles,
            yearly_minutes: snapshot.yearly.minutes,
            fastest_all_time_speed: snapshot.fastest_speed_all_time,
            last_run_id: snapshot.last_run_id,
        }
    }
}

/// Profile document stored at `users/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub username: String,
    #[serde(flatten)]
    pub stats: AggregateSnapshot,
}

/// Minimal identity shown in search results, requests and friend lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub uid: UserId,
    pub username: String,
    pub email: String,
}
