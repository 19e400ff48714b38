//! Document tree persisted to a single JSON file
//!
//! Each mutation reads the file, edits the tree and writes it back through a
//! temporary file and a rename, so a crash never leaves a half-written tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::tree::{self, TreePath};
use super::DocumentStore;
use crate::error::GhostError;

/// Document tree stored in one JSON file
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at `path`. The file is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Value, GhostError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Value::Object(Map::new())),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
            Err(e) => Err(GhostError::TransientIo(format!(
                "reading {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, root: &Value) -> Result<(), GhostError> {
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(root)?;
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| GhostError::TransientIo(format!("writing {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            GhostError::TransientIo(format!("replacing {}: {e}", self.path.display()))
        })
    }

    async fn modify<F>(&self, edit: F) -> Result<(), GhostError>
    where
        F: FnOnce(&mut Value) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut root = self.load().await?;
        edit(&mut root);
        self.save(&root).await
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, path: &TreePath) -> Result<Option<Value>, GhostError> {
        let _guard = self.lock.lock().await;
        let root = self.load().await?;
        Ok(tree::get(&root, path).cloned())
    }

    async fn set(&self, path: &TreePath, value: Value) -> Result<(), GhostError> {
        self.modify(|root| tree::set(root, path, value)).await
    }

    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), GhostError> {
        self.modify(|root| tree::update(root, path, fields)).await
    }

    async fn remove(&self, path: &TreePath) -> Result<(), GhostError> {
        self.modify(|root| tree::remove(root, path)).await
    }
}
