//! Ghost core - run tracking and driving statistics
//!
//! Ghost records GPS-tracked driving/running sessions and keeps per-user
//! cumulative statistics in a hosted document tree. This crate holds the
//! client-side logic: live position fix → accumulated run metrics → finished
//! run record → rollup into the user's today/week/month/year totals.
//!
//! ## Modules
//!
//! - **Tracking**: [`sampler`] delivers fixes, [`accumulator`] folds them into
//!   run state, [`tracker`] owns the session lifecycle and save/commit protocol
//! - **Statistics**: [`rollup`] merges a finished run into the aggregate snapshot
//! - **Backend**: [`persistence`] abstracts the document tree; [`social`] covers
//!   profiles and the friend graph

pub mod accumulator;
pub mod auth;
pub mod config;
pub mod error;
pub mod geo;
pub mod persistence;
pub mod rollup;
pub mod sampler;
pub mod social;
pub mod tracker;
pub mod types;

pub use accumulator::{LiveStats, RunAccumulator, RunState};
pub use auth::{require_session, AuthenticatedSession};
pub use config::{GhostConfig, Theme, TrackerConfig};
pub use error::{CommitStage, GhostError};
pub use persistence::{DocumentStore, JsonFileStore, MemoryStore, PersistencePort, RemoteStore};
pub use rollup::StatsRollup;
pub use sampler::{Authorization, GeoSampler, LocationProvider, SamplerStatus};
pub use tracker::{commit_run, CommitOutcome, RunTracker, TrackerPhase};
pub use types::{
    AggregateSnapshot, Coordinate, Period, PeriodView, PositionFix, RecordId, RunRecord, UserId,
};

/// Crate version, reported by the CLI
pub const GHOST_VERSION: &str = env!("CARGO_PKG_VERSION");
