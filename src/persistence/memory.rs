//! In-process document tree

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::tree::{self, TreePath};
use super::DocumentStore;
use crate::error::GhostError;

/// Document tree held in memory
#[derive(Debug)]
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    pub fn from_value(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    /// Copy of the whole tree
    pub async fn dump(&self) -> Value {
        self.root.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &TreePath) -> Result<Option<Value>, GhostError> {
        let root = self.root.read().await;
        Ok(tree::get(&root, path).cloned())
    }

    async fn set(&self, path: &TreePath, value: Value) -> Result<(), GhostError> {
        let mut root = self.root.write().await;
        tree::set(&mut root, path, value);
        Ok(())
    }

    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> Result<(), GhostError> {
        let mut root = self.root.write().await;
        tree::update(&mut root, path, fields);
        Ok(())
    }

    async fn remove(&self, path: &TreePath) -> Result<(), GhostError> {
        let mut root = self.root.write().await;
        tree::remove(&mut root, path);
        Ok(())
    }
}
