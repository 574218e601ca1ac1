//! Integration tests for checkpoint documents across both backends

use std::sync::Arc;
use std::thread;
use synapse_janitor::error::StorageError;
use synapse_janitor::purge::{PurgeProgress, RoomPurgeEntry, RoomToPurge, Status};
use synapse_janitor::store::{
    CheckpointStore, JsonFileStore, StorageBackend, PURGE_PROGRESS_KEY,
};
use tempfile::TempDir;

fn sample_progress() -> PurgeProgress {
    let mut entry = RoomPurgeEntry::new(
        RoomToPurge::new("!a:example.org", true),
        Some("#a:example.org".to_string()),
    );
    entry.status = Status::Purging;
    entry.delete_id = Some("delete-1".to_string());
    let mut progress = PurgeProgress::new(vec![entry]);
    progress.record_state_group_progress(4, 10);
    progress.rows_deleted = 123;
    progress
}

#[test]
fn test_progress_survives_reopen_on_both_backends() {
    for backend in [StorageBackend::Files, StorageBackend::Sled] {
        let dir = TempDir::new().unwrap();
        {
            let store = CheckpointStore::open(dir.path(), backend).unwrap();
            store.save(PURGE_PROGRESS_KEY, &sample_progress()).unwrap();
        }

        let store = CheckpointStore::open(dir.path(), backend).unwrap();
        let (loaded, found): (PurgeProgress, bool) = store.load(PURGE_PROGRESS_KEY).unwrap();
        assert!(found, "{:?} backend lost the document", backend);
        assert_eq!(loaded, sample_progress());
        assert_eq!(loaded.state_groups_state_progress, 40);
    }
}

#[test]
fn test_file_backend_writes_readable_json() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::open(dir.path(), StorageBackend::Files).unwrap();
    store.save(PURGE_PROGRESS_KEY, &sample_progress()).unwrap();

    let files = JsonFileStore::new(dir.path()).unwrap();
    let raw = std::fs::read_to_string(files.path_for(PURGE_PROGRESS_KEY)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["rooms"][0]["room_id"], "!a:example.org");
    assert_eq!(json["rooms"][0]["status"], "purging");
    assert_eq!(json["state_groups_deleted"], 4);
}

#[test]
fn test_corrupt_document_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::open(dir.path(), StorageBackend::Files).unwrap();
    let files = JsonFileStore::new(dir.path()).unwrap();
    std::fs::write(files.path_for(PURGE_PROGRESS_KEY), "{\"rooms\": [").unwrap();

    let result: Result<(PurgeProgress, bool), _> = store.load(PURGE_PROGRESS_KEY);
    assert!(matches!(result, Err(StorageError::Corrupt { .. })));
}

#[test]
fn test_concurrent_saves_leave_a_whole_document() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CheckpointStore::open(dir.path(), StorageBackend::Files).unwrap());

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for j in 0..20u64 {
                    let mut progress = sample_progress();
                    progress.rows_deleted = i * 100 + j;
                    store.save(PURGE_PROGRESS_KEY, &progress).unwrap();
                    let _: (PurgeProgress, bool) = store.load(PURGE_PROGRESS_KEY).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (loaded, found): (PurgeProgress, bool) = store.load(PURGE_PROGRESS_KEY).unwrap();
    assert!(found);
    assert_eq!(loaded.rooms.len(), 1);
}

#[test]
fn test_remove_then_load_gives_default() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::open(dir.path(), StorageBackend::Sled).unwrap();
    store.save(PURGE_PROGRESS_KEY, &sample_progress()).unwrap();
    store.remove(PURGE_PROGRESS_KEY).unwrap();
    store.remove(PURGE_PROGRESS_KEY).unwrap();

    let (loaded, found): (PurgeProgress, bool) = store.load(PURGE_PROGRESS_KEY).unwrap();
    assert!(!found);
    assert!(loaded.is_empty());
}
