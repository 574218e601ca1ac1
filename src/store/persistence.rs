//! Sled-backed document backend

use crate::error::StorageError;
use crate::store::DocumentStore;
use sled::{Db, Tree};
use std::path::Path;

const TREE_DOCUMENTS: &str = "documents";

/// Documents kept in a `documents` tree of an embedded sled database.
pub struct SledDocumentStore {
    db: Db,
    documents: Tree,
}

impl SledDocumentStore {
    /// Open (or create) the sled database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(to_storage_error)?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StorageError> {
        let documents = db.open_tree(TREE_DOCUMENTS).map_err(to_storage_error)?;
        Ok(Self { db, documents })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_error)?;
        Ok(())
    }
}

impl DocumentStore for SledDocumentStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let raw = self
            .documents
            .get(key.as_bytes())
            .map_err(to_storage_error)?;
        Ok(raw.map(|value| value.to_vec()))
    }

    fn put(&self, key: &str, document: &[u8]) -> Result<(), StorageError> {
        self.documents
            .insert(key.as_bytes(), document)
            .map_err(to_storage_error)?;
        // Checkpoints must survive a crash right after the save returns.
        self.flush()
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.documents
            .remove(key.as_bytes())
            .map_err(to_storage_error)?;
        self.flush()
    }
}

fn to_storage_error(err: sled::Error) -> StorageError {
    StorageError::Backend(format!("sled: {}", err))
}
