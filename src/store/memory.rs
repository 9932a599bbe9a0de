use super::{FileStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// In-memory [`FileStore`] for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<PathBuf, Value>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    writes: Mutex<Vec<PathBuf>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, value: Value) {
        self.files.lock().insert(path.into(), value);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Value> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    pub fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        self.dirs.lock().contains(path.as_ref())
    }

    /// Every write so far, in order, including rewrites of the same path
    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn ensure_dir(&self, path: &Path) -> Result<(), StoreError> {
        self.dirs.lock().insert(path.to_path_buf());
        Ok(())
    }

    async fn read_json(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        Ok(self.files.lock().get(path).cloned())
    }

    async fn write_json(&self, path: &Path, value: &Value) -> Result<(), StoreError> {
        self.files.lock().insert(path.to_path_buf(), value.clone());
        self.writes.lock().push(path.to_path_buf());
        Ok(())
    }
}
