use super::{FileStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Store rooted in the real filesystem; paths are used as given
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl FileStore for FsStore {
    async fn ensure_dir(&self, path: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(path).await.map_err(|e| io_err(path, e))
    }

    async fn read_json(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(path, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::json(path, e))
    }

    async fn write_json(&self, path: &Path, value: &Value) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.ensure_dir(parent).await?;
        }
        let contents = serde_json::to_string_pretty(value).map_err(|e| StoreError::json(path, e))?;
        fs::write(path, contents).await.map_err(|e| io_err(path, e))
    }
}
