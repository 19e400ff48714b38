//! Run session lifecycle
//!
//! [`RunTracker`] drives one session at a time through
//! `Idle -> Tracking -> Stopped -> Finalized -> Idle`:
//!
//! - `start` launches the sampler, a single accumulator task that owns the
//!   [`RunAccumulator`] and drains fixes from a queue in arrival order, and an
//!   elapsed-time timer that only ever writes the elapsed counter.
//! - `stop` cancels the sampler, lets the accumulator drain what was already
//!   queued, and stops the timer.
//! - `save` turns the stopped state into a [`RunRecord`] (once) and commits it.
//!   The transient state is only reset after both remote writes succeed; on
//!   failure the same record is kept so a retry cannot count it twice.
//!
//! The commit is a read-modify-write with no isolation from other devices
//! saving for the same user at the same time. One of two racing saves can
//! silently lose its contribution to the snapshot (its run record is still
//! written).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SubsecRound, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::accumulator::{LiveStats, RunAccumulator, RunState};
use crate::auth::AuthenticatedSession;
use crate::config::TrackerConfig;
use crate::error::{CommitStage, GhostError};
use crate::persistence::PersistencePort;
use crate::rollup::StatsRollup;
use crate::sampler::{GeoSampler, LocationProvider, SamplerStatus};
use crate::types::{AggregateSnapshot, PositionFix, RecordId, RunRecord, UserId};

/// Externally visible lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Tracking,
    Stopped,
    Finalized,
}

struct ActiveRun {
    sampler: GeoSampler,
    status: SamplerStatus,
    accumulator: JoinHandle<RunAccumulator>,
    timer: JoinHandle<()>,
    timer_cancel: watch::Sender<bool>,
    elapsed_secs: Arc<AtomicU64>,
}

enum Phase {
    Idle,
    Tracking(ActiveRun),
    Stopped(RunState),
    Finalized { state: RunState, record: RunRecord },
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub record_id: RecordId,
    pub snapshot: AggregateSnapshot,
    /// The snapshot already contained this record from an earlier attempt
    pub already_applied: bool,
}

/// Owns the state of the current run session
pub struct RunTracker {
    config: TrackerConfig,
    phase: Phase,
    live: Arc<watch::Sender<LiveStats>>,
}

impl RunTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let (live, _) = watch::channel(LiveStats::default());
        Self {
            config,
            phase: Phase::Idle,
            live: Arc::new(live),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        match self.phase {
            Phase::Idle => TrackerPhase::Idle,
            Phase::Tracking(_) => TrackerPhase::Tracking,
            Phase::Stopped(_) => TrackerPhase::Stopped,
            Phase::Finalized { .. } => TrackerPhase::Finalized,
        }
    }

    /// Live figures, updated after every fix and timer tick
    pub fn subscribe(&self) -> watch::Receiver<LiveStats> {
        self.live.subscribe()
    }

    /// Sampler outcome of the session being tracked
    pub fn sampler_status(&self) -> Option<SamplerStatus> {
        match &self.phase {
            Phase::Tracking(run) => Some(run.status),
            _ => None,
        }
    }

    /// State of a stopped or finalized session
    pub fn stopped_state(&self) -> Option<&RunState> {
        match &self.phase {
            Phase::Stopped(state) | Phase::Finalized { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Record awaiting a successful commit
    pub fn pending_record(&self) -> Option<&RunRecord> {
        match &self.phase {
            Phase::Finalized { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Start a new session fed by `provider`.
    ///
    /// A refused location permission does not fail the call; the returned
    /// status is `Degraded` and the session records an empty route. An invalid
    /// tracker config fails with `InvalidConfig` before anything is launched.
    pub async fn start(
        &mut self,
        provider: Box<dyn LocationProvider>,
    ) -> Result<SamplerStatus, GhostError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(GhostError::InvalidState(format!(
                "cannot start while {:?}",
                self.phase()
            )));
        }
        self.config.validate()?;

        let started_at = Utc::now().trunc_subsecs(0);
        self.live.send_replace(LiveStats::default());

        let (fix_tx, mut fix_rx) = mpsc::unbounded_channel::<PositionFix>();
        let live = self.live.clone();
        let accumulator = tokio::spawn(async move {
            let mut acc = RunAccumulator::new(started_at);
            while let Some(fix) = fix_rx.recv().await {
                let stats = acc.on_fix(&fix);
                live.send_modify(|current| {
                    *current = LiveStats {
                        elapsed_secs: current.elapsed_secs,
                        ..stats
                    }
                });
            }
            acc
        });

        let mut sampler = GeoSampler::new(provider, self.config.distance_filter_meters);
        let status = sampler
            .start(move |fix| {
                // Fails only once the accumulator is gone, i.e. after stop
                let _ = fix_tx.send(fix);
            })
            .await?;

        let elapsed_secs = Arc::new(AtomicU64::new(0));
        let (timer_cancel, timer) = spawn_timer(
            self.config.tick_interval(),
            elapsed_secs.clone(),
            self.live.clone(),
        );

        if let SamplerStatus::Degraded(reason) = status {
            log::warn!("session started without location: {}", reason.to_error());
        }
        log::info!("run session started at {started_at}");

        self.phase = Phase::Tracking(ActiveRun {
            sampler,
            status,
            accumulator,
            timer,
            timer_cancel,
            elapsed_secs,
        });
        Ok(status)
    }

    /// Stop the session. No fix is applied after this returns.
    pub async fn stop(&mut self) -> Result<LiveStats, GhostError> {
        let run = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Tracking(run) => run,
            other => {
                self.phase = other;
                return Err(GhostError::InvalidState(format!(
                    "cannot stop while {:?}",
                    self.phase()
                )));
            }
        };

        let state = finish_run(run).await?;
        let stats = state.live_stats();
        self.live.send_replace(stats);
        log::info!(
            "run session stopped: {:.2} mi, {} s, {} points",
            state.distance,
            state.elapsed_secs,
            state.route.len()
        );

        self.phase = Phase::Stopped(state);
        Ok(stats)
    }

    /// Snapshot the stopped session into a record without committing it.
    ///
    /// Returns the already-finalized record if called again before commit.
    pub fn finalize(&mut self) -> Result<&RunRecord, GhostError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Stopped(state) => {
                let record = state.to_record(RecordId::new(), Utc::now().trunc_subsecs(0));
                self.phase = Phase::Finalized { state, record };
            }
            finalized @ Phase::Finalized { .. } => self.phase = finalized,
            other => {
                self.phase = other;
                return Err(GhostError::InvalidState(format!(
                    "nothing to save while {:?}",
                    self.phase()
                )));
            }
        }

        match &self.phase {
            Phase::Finalized { record, .. } => Ok(record),
            _ => Err(GhostError::InvalidState("run was not finalized".to_string())),
        }
    }

    /// Finalize (if needed) and commit the session for `session`'s user.
    ///
    /// On success the tracker returns to idle, so a second `save` is rejected
    /// with `InvalidState`. On failure the record is kept and `save` may be
    /// called again to retry exactly the same record.
    pub async fn save<P>(
        &mut self,
        port: &P,
        session: &AuthenticatedSession,
    ) -> Result<CommitOutcome, GhostError>
    where
        P: PersistencePort + ?Sized,
    {
        let record = self.finalize()?.clone();

        let outcome =
            commit_run(port, &session.uid, &record, self.config.remote_timeout()).await?;

        self.reset();
        Ok(outcome)
    }

    /// Abandon the current session, stopping it first if it is still tracking
    pub async fn discard(&mut self) {
        if let Phase::Tracking(run) = std::mem::replace(&mut self.phase, Phase::Idle) {
            if let Err(e) = finish_run(run).await {
                log::warn!("discarded run did not stop cleanly: {e}");
            }
        }
        log::info!("run session discarded");
        self.reset();
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.live.send_replace(LiveStats::default());
    }
}

fn spawn_timer(
    tick: Duration,
    elapsed_secs: Arc<AtomicU64>,
    live: Arc<watch::Sender<LiveStats>>,
) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (cancel, mut cancelled) = watch::channel(false);
    let tick_ms = tick.as_millis() as u64;
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancelled.changed() => break,
                _ = interval.tick() => {
                    ticks += 1;
                    let secs = ticks * tick_ms / 1000;
                    elapsed_secs.store(secs, Ordering::Relaxed);
                    live.send_modify(|current| current.elapsed_secs = secs);
                }
            }
        }
    });
    (cancel, handle)
}

async fn finish_run(mut run: ActiveRun) -> Result<RunState, GhostError> {
    // Stopping the sampler drops the queue's only sender, which ends the accumulator
    run.sampler.stop().await;
    let _ = run.timer_cancel.send(true);

    let timer_result = run.timer.await;
    let acc_result = run.accumulator.await;

    if let Err(e) = timer_result {
        log::error!("elapsed timer failed: {e}");
    }
    let mut acc = acc_result
        .map_err(|e| GhostError::InvalidState(format!("accumulator task failed: {e}")))?;
    acc.set_elapsed(run.elapsed_secs.load(Ordering::Relaxed));
    Ok(acc.into_state())
}

async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, GhostError>
where
    F: Future<Output = Result<T, GhostError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| GhostError::Timeout { operation, after })?
}

/// Commit `record` for `user`: read the snapshot, roll the record into it,
/// write the record, then write the snapshot. Each round-trip is bounded by
/// `timeout`.
///
/// A snapshot that already carries this record's id is left unchanged, so
/// retrying after a lost acknowledgement does not double count.
pub async fn commit_run<P>(
    port: &P,
    user: &UserId,
    record: &RunRecord,
    timeout: Duration,
) -> Result<CommitOutcome, GhostError>
where
    P: PersistencePort + ?Sized,
{
    let fail = |stage: CommitStage| {
        move |source: GhostError| {
            log::error!("commit of run {} failed at {stage}: {source}", record.id);
            GhostError::Commit {
                stage,
                record_id: record.id,
                source: Box::new(source),
            }
        }
    };

    let previous = bounded("read snapshot", timeout, port.read_snapshot(user))
        .await
        .map_err(fail(CommitStage::ReadSnapshot))?;

    let already_applied = StatsRollup::already_applied(&previous, record);
    let snapshot = if already_applied {
        log::info!("run {} already counted for {user}; not rolling up again", record.id);
        previous
    } else {
        StatsRollup::apply(&previous, record)
    };

    bounded("write run record", timeout, port.write_run_record(user, record))
        .await
        .map_err(fail(CommitStage::WriteRecord))?;

    if !already_applied {
        bounded("write snapshot", timeout, port.write_snapshot(user, &snapshot))
            .await
            .map_err(fail(CommitStage::WriteSnapshot))?;
    }

    log::info!(
        "run {} saved for {user}: {:.2} mi in {} s",
        record.id,
        record.distance_miles,
        record.duration_secs
    );

    Ok(CommitOutcome {
        record_id: record.id,
        snapshot,
        already_applied,
    })
}
