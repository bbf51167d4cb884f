use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::types::Snapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot json in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable home of the latest snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Snapshot>, StoreError>;
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        debug!(target: "reviews.store", path = %self.path.display(), reviews = snapshot.count(), "store.loaded");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let body = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &body).await.map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;

        debug!(target: "reviews.store", path = %self.path.display(), reviews = snapshot.count(), "store.saved");
        Ok(())
    }
}
