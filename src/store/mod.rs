//! JSON file persistence
//!
//! [`FileStore`] is the only way the indexer touches the data tree.
//! [`FsStore`] writes real files; [`MemoryStore`] keeps everything in a map.

mod fs;
mod layout;
mod memory;

pub use fs::FsStore;
pub use layout::DataLayout;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Creates the directory and its parents if missing
    async fn ensure_dir(&self, path: &Path) -> Result<(), StoreError>;

    /// `Ok(None)` when the file does not exist
    async fn read_json(&self, path: &Path) -> Result<Option<Value>, StoreError>;

    /// Pretty-printed; parent directories are created as needed
    async fn write_json(&self, path: &Path, value: &Value) -> Result<(), StoreError>;
}

/// Typed read. A missing file is `Ok(None)`; a shape mismatch is an error.
pub async fn read_as<T: DeserializeOwned>(
    store: &dyn FileStore,
    path: &Path,
) -> Result<Option<T>, StoreError> {
    match store.read_json(path).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::json(path, e)),
        None => Ok(None),
    }
}

pub async fn write_as<T: Serialize>(
    store: &dyn FileStore,
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|e| StoreError::json(path, e))?;
    store.write_json(path, &value).await
}
