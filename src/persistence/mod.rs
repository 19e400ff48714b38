//! Persistence boundary
//!
//! The hosted backend is a key/value document tree. [`DocumentStore`] is the
//! raw single-key interface to it; [`PersistencePort`] is the narrow interface
//! the run tracker commits through. [`RemoteStore`] implements the latter on
//! top of any document store using the `users/{uid}` layout.

mod file;
mod memory;
pub mod tree;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use tree::TreePath;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::GhostError;
use crate::types::{AggregateSnapshot, RecordId, RunRecord, UserId};

/// Single-key reads and writes against the document tree
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Value at `path`, or `None` if nothing is stored there
    async fn get(&self, path: &TreePath) -> Result<Option<Value>, GhostError>;

    /// Replace the value at `path`
    async fn set(&self, path: &TreePath, value: Value) -> Result<(), GhostError>;

    /// Overwrite only the given children of the object at `path`
    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), GhostError>;

    /// Delete the value at `path`
    async fn remove(&self, path: &TreePath) -> Result<(), GhostError>;
}

/// What the run tracker needs from the backend
#[async_trait]
pub trait PersistencePort: Send + Sync {
    /// Current aggregate snapshot; `NotFound` if the user has no record
    async fn read_snapshot(&self, user: &UserId) -> Result<AggregateSnapshot, GhostError>;

    /// Store a run under its own id. Writing the same record again overwrites it.
    async fn write_run_record(
        &self,
        user: &UserId,
        record: &RunRecord,
    ) -> Result<RecordId, GhostError>;

    /// Replace the user's aggregate snapshot
    async fn write_snapshot(
        &self,
        user: &UserId,
        snapshot: &AggregateSnapshot,
    ) -> Result<(), GhostError>;
}

/// [`PersistencePort`] over a document tree
#[derive(Debug)]
pub struct RemoteStore<S> {
    store: S,
}

impl<S: DocumentStore> RemoteStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying document tree
    pub fn store(&self) -> &S {
        &self.store
    }

    /// All saved runs of `user`, oldest first
    pub async fn list_runs(&self, user: &UserId) -> Result<Vec<RunRecord>, GhostError> {
        let Some(Value::Object(drives)) = self.store.get(&TreePath::drives(user)).await? else {
            return Ok(Vec::new());
        };

        let mut runs = Vec::with_capacity(drives.len());
        for (key, value) in drives {
            match serde_json::from_value::<RunRecord>(legacy_drive(&key, value)) {
                Ok(run) => runs.push(run),
                Err(e) => log::warn!("skipping unreadable run {key} of {user}: {e}"),
            }
        }
        runs.sort_by_key(|r| r.saved_at);
        Ok(runs)
    }
}

/// Fill in what drives saved by older clients lack: the id (taken from the
/// key), `startedAt` (taken from `date`) and whole-second timestamps.
fn legacy_drive(key: &str, value: Value) -> Value {
    let Value::Object(mut drive) = value else {
        return value;
    };

    drive
        .entry("id")
        .or_insert_with(|| Value::String(RecordId::from_key(key).to_string()));

    for field in ["date", "startedAt"] {
        let fractional = drive.get(field).filter(|v| v.is_f64()).and_then(Value::as_f64);
        if let Some(secs) = fractional {
            drive.insert(field.to_string(), Value::from(secs.floor() as i64));
        }
    }
    if !drive.contains_key("startedAt") {
        if let Some(date) = drive.get("date").cloned() {
            drive.insert("startedAt".to_string(), date);
        }
    }
    Value::Object(drive)
}

#[async_trait]
impl<S: DocumentStore> PersistencePort for RemoteStore<S> {
    async fn read_snapshot(&self, user: &UserId) -> Result<AggregateSnapshot, GhostError> {
        let path = TreePath::user(user);
        let value = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| GhostError::NotFound(path.to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn write_run_record(
        &self,
        user: &UserId,
        record: &RunRecord,
    ) -> Result<RecordId, GhostError> {
        let value = serde_json::to_value(record)?;
        self.store
            .set(&TreePath::drive(user, &record.id), value)
            .await?;
        Ok(record.id)
    }

    async fn write_snapshot(
        &self,
        user: &UserId,
        snapshot: &AggregateSnapshot,
    ) -> Result<(), GhostError> {
        let fields = match serde_json::to_value(snapshot)? {
            Value::Object(map) => map,
            other => {
                return Err(GhostError::InvalidInput(format!(
                    "snapshot serialized to a non-object: {other}"
                )))
            }
        };
        self.store.update(&TreePath::user(user), fields).await
    }
}
