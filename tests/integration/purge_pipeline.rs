//! Integration tests for the purge orchestrator

use crate::integration::fakes::{
    failed_shard, shard, shard_with_users, FakeAdmin, MemoryStateStore, StoreOp,
};
use crate::integration::test_utils::{checkpoints, fast_purge_settings};
use std::sync::Arc;
use std::time::Duration;
use synapse_janitor::error::PurgeError;
use synapse_janitor::purge::{
    PurgeOrchestrator, PurgeOutcome, PurgeProgress, PurgeSettings, PurgeSummary, RoomPurgeEntry,
    RoomToPurge, Status,
};
use synapse_janitor::store::{CheckpointStore, PURGE_PROGRESS_KEY};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ROOM_A: &str = "!a:example.org";
const ROOM_B: &str = "!b:example.org";
const ROOM_C: &str = "!c:example.org";

/// A: groups 10 (3 rows) and 5 (2 rows); B: group 11 (4 rows); C is not purged.
fn seeded_store() -> Arc<MemoryStateStore> {
    let store = Arc::new(MemoryStateStore::new());
    store.add_group(ROOM_A, 10, 3);
    store.add_group(ROOM_A, 5, 2);
    store.add_group(ROOM_B, 11, 4);
    store.add_group(ROOM_C, 20, 1);
    store
}

fn queue(checkpoints: &CheckpointStore, rooms: &[(&str, bool)]) {
    let entries = rooms
        .iter()
        .map(|(room_id, ban)| RoomPurgeEntry::new(RoomToPurge::new(*room_id, *ban), None))
        .collect();
    checkpoints
        .save(PURGE_PROGRESS_KEY, &PurgeProgress::new(entries))
        .unwrap();
}

fn saved(checkpoints: &CheckpointStore) -> Option<PurgeProgress> {
    let (progress, found): (PurgeProgress, bool) = checkpoints.load(PURGE_PROGRESS_KEY).unwrap();
    found.then_some(progress)
}

fn orchestrator(
    admin: &Arc<FakeAdmin>,
    store: &Arc<MemoryStateStore>,
    checkpoints: &CheckpointStore,
) -> PurgeOrchestrator {
    PurgeOrchestrator::new(
        admin.clone(),
        store.clone(),
        checkpoints.clone(),
        fast_purge_settings(),
    )
}

fn both_complete(admin: &FakeAdmin) {
    admin.script(ROOM_A, vec![vec![shard("complete")]]);
    admin.script(ROOM_B, vec![vec![shard("complete")]]);
}

#[tokio::test]
async fn test_purges_rooms_end_to_end() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    admin.script(
        ROOM_A,
        vec![
            vec![shard("shutting_down")],
            vec![shard("purging"), shard("complete")],
        ],
    );
    admin.script(ROOM_B, vec![vec![shard("complete")]]);
    queue(&checkpoints, &[(ROOM_A, true), (ROOM_B, false)]);

    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PurgeOutcome::Completed(PurgeSummary {
            rooms: 2,
            state_groups: 3,
            rows_deleted: 9,
            delete_errors: 0,
            cleanup_rows: 3,
        })
    );

    let submitted = admin.state.lock().submitted.clone();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].0, ROOM_A);
    assert!(submitted[0].1.block);
    assert!(submitted[0].1.force_purge);
    assert_eq!(submitted[1].0, ROOM_B);
    assert!(!submitted[1].1.block);

    // Ascending state group order, then per-room cleanup.
    assert_eq!(
        store.log(),
        vec![
            StoreOp::DeleteRows(5),
            StoreOp::DeleteRows(10),
            StoreOp::DeleteRows(11),
            StoreOp::DeleteGroupsForRoom(ROOM_A.to_string()),
            StoreOp::DeleteGroupsForRoom(ROOM_B.to_string()),
        ]
    );
    assert_eq!(store.row_count(), 1, "only the untouched room keeps rows");
    assert_eq!(store.group_count(), 1);
    assert!(saved(&checkpoints).is_none(), "progress document is removed");
}

#[tokio::test]
async fn test_resumes_from_saved_index() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = Arc::new(MemoryStateStore::new());
    // Group 5 was already emptied by the interrupted run.
    store.add_group(ROOM_A, 10, 3);
    store.add_group(ROOM_A, 5, 0);
    store.add_group(ROOM_B, 11, 4);
    let admin = Arc::new(FakeAdmin::new());

    let mut progress = PurgeProgress::new(
        [ROOM_A, ROOM_B]
            .iter()
            .map(|room_id| RoomPurgeEntry {
                status: Status::Complete,
                delete_id: Some(format!("delete-{}", room_id)),
                ..RoomPurgeEntry::new(RoomToPurge::new(*room_id, false), None)
            })
            .collect(),
    );
    progress.record_state_group_progress(1, 3);
    progress.rows_deleted = 2;
    checkpoints.save(PURGE_PROGRESS_KEY, &progress).unwrap();

    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let PurgeOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(summary.rows_deleted, 9);
    assert!(admin.state.lock().submitted.is_empty(), "nothing resubmitted");
    assert!(admin.state.lock().polls.is_empty(), "complete rooms are not polled");
    assert_eq!(
        store.log(),
        vec![
            StoreOp::DeleteRows(10),
            StoreOp::DeleteRows(11),
            StoreOp::DeleteGroupsForRoom(ROOM_A.to_string()),
            StoreOp::DeleteGroupsForRoom(ROOM_B.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_room_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    admin.script(ROOM_A, vec![vec![failed_shard("quarantine")]]);
    admin.script(ROOM_B, vec![vec![shard("complete")]]);
    queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);

    let err = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PurgeError::RoomFailed { room_id, message } => {
            assert_eq!(room_id, ROOM_A);
            assert!(message.contains("quarantine"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let progress = saved(&checkpoints).expect("progress document is kept");
    let room_a = &progress.rooms[0];
    assert_eq!(room_a.status, Status::Failed);
    assert!(room_a.error.as_deref().unwrap_or_default().contains("quarantine"));
    assert!(store.log().is_empty(), "no state rows deleted");
}

#[tokio::test]
async fn test_interrupted_run_deletes_same_total() {
    let uninterrupted = {
        let dir = TempDir::new().unwrap();
        let checkpoints = checkpoints(&dir);
        let store = seeded_store();
        let admin = Arc::new(FakeAdmin::new());
        both_complete(&admin);
        queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);
        orchestrator(&admin, &store, &checkpoints)
            .run(CancellationToken::new())
            .await
            .unwrap()
    };

    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    both_complete(&admin);
    queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);

    let token = CancellationToken::new();
    store.state.lock().cancel_after_deletes = Some((2, token.clone()));
    let first = orchestrator(&admin, &store, &checkpoints)
        .run(token)
        .await
        .unwrap();
    assert_eq!(first, PurgeOutcome::Cancelled);

    let progress = saved(&checkpoints).expect("checkpoint kept after cancel");
    assert_eq!(progress.state_groups_deleted, 2);
    assert_eq!(progress.rows_deleted, 5);
    assert_eq!(progress.state_groups_state_progress, 66);

    store.state.lock().cancel_after_deletes = None;
    let second = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let (PurgeOutcome::Completed(a), PurgeOutcome::Completed(b)) = (uninterrupted, second) else {
        panic!("both runs should complete");
    };
    assert_eq!(a.rows_deleted, b.rows_deleted);
    assert_eq!(a.state_groups, b.state_groups);
}

#[tokio::test]
async fn test_submit_failure_aborts_and_resumes_with_remaining_rooms() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    both_complete(&admin);
    admin.state.lock().failing_submits.insert(ROOM_B.to_string());
    queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);

    let err = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PurgeError::Submit { ref room_id, .. } if room_id == ROOM_B));

    let progress = saved(&checkpoints).unwrap();
    assert!(progress.rooms[0].is_submitted());
    assert!(!progress.rooms[1].is_submitted());
    assert!(progress.rooms[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("500")));
    assert!(admin.state.lock().polls.is_empty(), "no polling after a failed submit");

    admin.state.lock().failing_submits.clear();
    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, PurgeOutcome::Completed(_)));
    assert_eq!(admin.submitted_rooms(), vec![ROOM_A, ROOM_B]);
}

#[tokio::test]
async fn test_state_group_delete_errors_are_counted_and_skipped() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    store.state.lock().failing_groups.insert(10);
    let admin = Arc::new(FakeAdmin::new());
    both_complete(&admin);
    queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);

    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let PurgeOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(summary.delete_errors, 1);
    assert_eq!(summary.rows_deleted, 6);
    assert!(store.log().contains(&StoreOp::DeleteRows(11)));
}

#[tokio::test]
async fn test_cancel_while_polling_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    admin.script(ROOM_A, vec![vec![shard("purging")]]);
    queue(&checkpoints, &[(ROOM_A, false)]);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(token)
        .await
        .unwrap();
    assert_eq!(outcome, PurgeOutcome::Cancelled);

    let progress = saved(&checkpoints).unwrap();
    assert_eq!(progress.rooms[0].status, Status::Purging);
    assert!(store.log().is_empty());
}

#[tokio::test]
async fn test_lookup_failure_keeps_polled_state() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    store.state.lock().fail_lookup = true;
    let admin = Arc::new(FakeAdmin::new());
    admin.script(
        ROOM_A,
        vec![vec![
            shard_with_users("complete", &["@a:x", "@b:x"]),
            shard_with_users("purging", &["@b:x", "@c:x"]),
        ]],
    );
    queue(&checkpoints, &[(ROOM_A, false)]);

    let err = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PurgeError::Lookup { .. }));

    let progress = saved(&checkpoints).unwrap();
    assert_eq!(progress.rooms[0].status, Status::Complete);
    assert_eq!(progress.rooms[0].affected_users, vec!["@a:x", "@b:x", "@c:x"]);
}

#[tokio::test]
async fn test_nothing_to_do_without_progress_document() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());

    let outcome = orchestrator(&admin, &store, &checkpoints)
        .run(CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, PurgeOutcome::NothingToDo);
    assert!(store.log().is_empty());
}

#[tokio::test]
async fn test_row_progress_is_saved_once_per_persist_interval() {
    let dir = TempDir::new().unwrap();
    let checkpoints = checkpoints(&dir);
    let store = seeded_store();
    let admin = Arc::new(FakeAdmin::new());
    both_complete(&admin);
    queue(&checkpoints, &[(ROOM_A, false), (ROOM_B, false)]);

    let token = CancellationToken::new();
    {
        let mut state = store.state.lock();
        state.watch_checkpoints = Some(checkpoints.clone());
        state.cancel_after_deletes = Some((2, token.clone()));
    }

    let settings = PurgeSettings {
        persist_interval: Duration::from_secs(3600),
        ..fast_purge_settings()
    };
    let outcome = PurgeOrchestrator::new(admin.clone(), store.clone(), checkpoints.clone(), settings)
        .run(token)
        .await
        .unwrap();
    assert_eq!(outcome, PurgeOutcome::Cancelled);

    // Nothing was written between deletes, only once the loop ended.
    assert_eq!(store.state.lock().saved_resume_indexes, vec![0, 0]);
    let progress = saved(&checkpoints).unwrap();
    assert_eq!(progress.state_groups_deleted, 2);
    assert_eq!(progress.rows_deleted, 5);
}
