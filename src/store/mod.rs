//! Checkpoint Store
//!
//! Named JSON documents that carry progress across restarts. The backend only moves
//! bytes; [`CheckpointStore`] owns the JSON encoding and serialises every access
//! behind a single process-wide lock, so a save is never observed half-written by a
//! concurrent load.

pub mod files;
pub mod persistence;

pub use files::JsonFileStore;
pub use persistence::SledDocumentStore;

use crate::error::StorageError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Key of the in-flight purge run document.
pub const PURGE_PROGRESS_KEY: &str = "purge_progress";
/// Key of the scheduler's last completed scan record.
pub const LAST_SCHEDULED_TASK_KEY: &str = "last_scheduled_task";
/// Key of the most recent room -> state row count snapshot.
pub const ROW_COUNT_BY_ROOM_KEY: &str = "state_groups_state_row_count_by_room";

static CHECKPOINT_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Raw key-document storage capability.
pub trait DocumentStore: Send + Sync {
    /// Read a document; `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &str, document: &[u8]) -> Result<(), StorageError>;
    /// Remove a document. Removing an absent document is not an error.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Which [`DocumentStore`] backs the checkpoint documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Files,
    Sled,
}

/// Typed JSON checkpoints over a [`DocumentStore`].
#[derive(Clone)]
pub struct CheckpointStore {
    backend: Arc<dyn DocumentStore>,
}

impl CheckpointStore {
    pub fn new(backend: Arc<dyn DocumentStore>) -> Self {
        Self { backend }
    }

    /// Open the configured backend rooted at `data_dir`, creating the directory.
    pub fn open(data_dir: &Path, backend: StorageBackend) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let backend: Arc<dyn DocumentStore> = match backend {
            StorageBackend::Files => Arc::new(JsonFileStore::new(data_dir)?),
            StorageBackend::Sled => Arc::new(SledDocumentStore::new(data_dir.join("documents.sled"))?),
        };
        Ok(Self::new(backend))
    }

    /// Load a document, returning the default value and `false` when it is absent.
    ///
    /// A document that exists but cannot be parsed is an error, never "empty".
    pub fn load<T>(&self, key: &str) -> Result<(T, bool), StorageError>
    where
        T: DeserializeOwned + Default,
    {
        let _guard = CHECKPOINT_LOCK.lock();
        let Some(raw) = self.backend.get(key)? else {
            debug!(key = %key, "checkpoint document not found");
            return Ok((T::default(), false));
        };
        let parsed = serde_json::from_slice(&raw).map_err(|e| StorageError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok((parsed, true))
    }

    pub fn save<T>(&self, key: &str, document: &T) -> Result<(), StorageError>
    where
        T: Serialize,
    {
        let encoded = serde_json::to_vec_pretty(document).map_err(|e| StorageError::Serialize {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let _guard = CHECKPOINT_LOCK.lock();
        self.backend.put(key, &encoded)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = CHECKPOINT_LOCK.lock();
        self.backend.delete(key)
    }
}
