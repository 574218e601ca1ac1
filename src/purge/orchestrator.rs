//! Room Deletion Orchestrator
//!
//! Drives one purge run end to end from the persisted [`PurgeProgress`]:
//!
//! 1. submit a delete request for every room not yet submitted,
//! 2. poll shard statuses until every room is `complete`, saving after each pass,
//! 3. gather the rooms' state groups in ascending id order,
//! 4. delete their `state_groups_state` rows from the saved resume index,
//! 5. delete the rooms' state groups and edges, then drop the progress document.
//!
//! Any fatal error leaves the last saved document in place so the next run resumes.

use crate::admin::{DeleteRoomRequest, RoomAdminApi, DEFAULT_PURGE_MESSAGE};
use crate::db::{StateGroupId, StateStore};
use crate::error::{PurgeError, ReconcileError};
use crate::purge::batch::{DeleteStatus, StateGroupBatchDeleter};
use crate::purge::model::{PurgeProgress, Status};
use crate::purge::reconcile::reconcile;
use crate::store::{CheckpointStore, PURGE_PROGRESS_KEY};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Purge run tuning
#[derive(Debug, Clone)]
pub struct PurgeSettings {
    /// Wait between status polling passes
    pub poll_interval: Duration,
    /// Minimum time between checkpoint saves while deleting state rows
    pub persist_interval: Duration,
    /// Message shown to room members while the room is shut down
    pub message: String,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            persist_interval: Duration::from_secs(5),
            message: DEFAULT_PURGE_MESSAGE.to_string(),
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeSummary {
    pub rooms: usize,
    pub state_groups: usize,
    pub rows_deleted: u64,
    pub delete_errors: u64,
    pub cleanup_rows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// No progress document was found.
    NothingToDo,
    Completed(PurgeSummary),
    /// Stopped by the cancellation token; the checkpoint is kept.
    Cancelled,
}

pub struct PurgeOrchestrator {
    admin: Arc<dyn RoomAdminApi>,
    store: Arc<dyn StateStore>,
    checkpoints: CheckpointStore,
    settings: PurgeSettings,
}

impl PurgeOrchestrator {
    pub fn new(
        admin: Arc<dyn RoomAdminApi>,
        store: Arc<dyn StateStore>,
        checkpoints: CheckpointStore,
        settings: PurgeSettings,
    ) -> Self {
        Self {
            admin,
            store,
            checkpoints,
            settings,
        }
    }

    /// Run (or resume) the purge described by the saved progress document.
    pub async fn run(&self, cancel: CancellationToken) -> Result<PurgeOutcome, PurgeError> {
        let (mut progress, found): (PurgeProgress, bool) =
            self.checkpoints.load(PURGE_PROGRESS_KEY)?;
        if !found || progress.is_empty() {
            debug!("no purge in progress");
            return Ok(PurgeOutcome::NothingToDo);
        }

        info!(
            rooms = progress.rooms.len(),
            pending = progress.pending_rooms(),
            resume_from = progress.state_groups_deleted,
            "starting purge run"
        );

        if !self.submit_pending(&mut progress, &cancel).await? {
            return Ok(PurgeOutcome::Cancelled);
        }
        if !self.poll_until_complete(&mut progress, &cancel).await? {
            return Ok(PurgeOutcome::Cancelled);
        }

        let ids = self.collect_state_groups(&progress).await?;
        let state_groups = ids.len();
        if !self.delete_state_group_rows(&mut progress, ids, &cancel).await? {
            return Ok(PurgeOutcome::Cancelled);
        }

        let mut cleanup_rows = 0u64;
        for room in &progress.rooms {
            let deleted = self
                .store
                .delete_state_groups_for_room(&room.room_id)
                .await
                .map_err(|source| PurgeError::Cleanup {
                    room_id: room.room_id.clone(),
                    source,
                })?;
            info!(room_id = %room.room_id, rows = deleted, "deleted state groups and edges");
            cleanup_rows += deleted;
        }

        self.checkpoints.remove(PURGE_PROGRESS_KEY)?;

        let summary = PurgeSummary {
            rooms: progress.rooms.len(),
            state_groups,
            rows_deleted: progress.rows_deleted,
            delete_errors: progress.delete_errors,
            cleanup_rows,
        };
        info!(
            rooms = summary.rooms,
            state_groups = summary.state_groups,
            rows_deleted = summary.rows_deleted,
            delete_errors = summary.delete_errors,
            "purge run complete"
        );
        Ok(PurgeOutcome::Completed(summary))
    }

    /// Submit delete requests for rooms without a delete id. A failed submission
    /// aborts the run. Returns `false` when cancelled.
    async fn submit_pending(
        &self,
        progress: &mut PurgeProgress,
        cancel: &CancellationToken,
    ) -> Result<bool, PurgeError> {
        for index in 0..progress.rooms.len() {
            if progress.rooms[index].is_submitted() {
                continue;
            }
            if cancel.is_cancelled() {
                return Ok(false);
            }

            let room_id = progress.rooms[index].room_id.clone();
            let request = DeleteRoomRequest::purge(progress.rooms[index].ban, &self.settings.message);
            let delete_id = match self.admin.delete_room(&room_id, &request).await {
                Ok(delete_id) => delete_id,
                Err(source) => {
                    error!(room_id = %room_id, error = %source, "room delete submission failed");
                    progress.rooms[index].error = Some(source.to_string());
                    self.checkpoints.save(PURGE_PROGRESS_KEY, progress)?;
                    return Err(PurgeError::Submit { room_id, source });
                }
            };

            info!(room_id = %room_id, delete_id = %delete_id, ban = request.block, "room delete submitted");
            progress.rooms[index].delete_id = Some(delete_id);
            progress.rooms[index].error = None;
            self.checkpoints.save(PURGE_PROGRESS_KEY, progress)?;
        }
        Ok(true)
    }

    /// Poll every unfinished room until all are complete. Saves after every pass.
    /// Returns `false` when cancelled while waiting.
    async fn poll_until_complete(
        &self,
        progress: &mut PurgeProgress,
        cancel: &CancellationToken,
    ) -> Result<bool, PurgeError> {
        let mut pass = 0u64;
        loop {
            if progress.all_complete() {
                return Ok(true);
            }
            pass += 1;

            let mut failure = None;
            for entry in progress.rooms.iter_mut().filter(|r| !r.status.is_complete()) {
                let shards = match self.admin.delete_status(&entry.room_id).await {
                    Ok(shards) => shards,
                    Err(source) => {
                        failure = Some(PurgeError::Poll {
                            room_id: entry.room_id.clone(),
                            source,
                        });
                        break;
                    }
                };

                match reconcile(&shards) {
                    Ok(reconciled) => {
                        let previous = entry.status;
                        if entry.advance(reconciled.status) {
                            info!(
                                room_id = %entry.room_id,
                                from = %previous,
                                to = %entry.status,
                                "room delete status changed"
                            );
                        }
                        entry.affected_users = reconciled.affected_users;
                        entry.error = None;
                    }
                    Err(ReconcileError::Failed { message }) => {
                        entry.advance(Status::Failed);
                        entry.error = Some(message.clone());
                        failure = Some(PurgeError::RoomFailed {
                            room_id: entry.room_id.clone(),
                            message,
                        });
                        break;
                    }
                }
            }

            self.checkpoints.save(PURGE_PROGRESS_KEY, progress)?;

            if let Some(err) = failure {
                error!(error = %err, "purge run stopped while polling");
                return Err(err);
            }
            if progress.all_complete() {
                info!(passes = pass, "all room deletes complete");
                return Ok(true);
            }

            debug!(
                pass,
                pending = progress.pending_rooms(),
                "waiting for room deletes to finish"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("purge run cancelled while polling");
                    return Ok(false);
                }
                _ = sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Every state group of every room, ascending. Lookup failures are fatal.
    async fn collect_state_groups(
        &self,
        progress: &PurgeProgress,
    ) -> Result<Vec<StateGroupId>, PurgeError> {
        let mut ids = Vec::new();
        for room in &progress.rooms {
            let groups = self
                .store
                .state_groups_for_room(&room.room_id)
                .await
                .map_err(|source| PurgeError::Lookup {
                    room_id: room.room_id.clone(),
                    source,
                })?;
            debug!(room_id = %room.room_id, state_groups = groups.len(), "found state groups");
            ids.extend(groups);
        }
        // Ascending order keeps the saved resume index meaningful across restarts.
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Delete state rows from the saved resume index, saving at most once per
    /// persist interval and once at the end. Returns `false` when cancelled.
    async fn delete_state_group_rows(
        &self,
        progress: &mut PurgeProgress,
        ids: Vec<StateGroupId>,
        cancel: &CancellationToken,
    ) -> Result<bool, PurgeError> {
        let total = ids.len();
        let resume_from = progress.state_groups_deleted.min(total);
        let base_rows = progress.rows_deleted;
        let base_errors = progress.delete_errors;
        progress.record_state_group_progress(resume_from, total);

        info!(total, resume_from, "deleting state_groups_state rows");

        let deleter = StateGroupBatchDeleter::new(Arc::clone(&self.store));
        let (mut statuses, handle) = deleter.delete(ids.into(), resume_from, cancel.clone());

        let apply = |progress: &mut PurgeProgress, status: DeleteStatus| {
            progress.record_state_group_progress(status.state_groups_processed, total);
            progress.rows_deleted = base_rows + status.rows_deleted;
            progress.delete_errors = base_errors + status.errors;
        };

        let mut last_persist = Instant::now();
        while let Some(status) = statuses.recv().await {
            apply(progress, status);
            if last_persist.elapsed() >= self.settings.persist_interval {
                self.checkpoints.save(PURGE_PROGRESS_KEY, progress)?;
                last_persist = Instant::now();
                info!(
                    processed = progress.state_groups_deleted,
                    total,
                    percent = progress.state_groups_state_progress,
                    rows_deleted = progress.rows_deleted,
                    errors = progress.delete_errors,
                    "deleting state_groups_state rows"
                );
            }
        }

        let last = handle
            .await
            .map_err(|e| PurgeError::Task(e.to_string()))?;
        apply(progress, last);
        self.checkpoints.save(PURGE_PROGRESS_KEY, progress)?;

        if last.state_groups_processed < total {
            warn!(
                processed = last.state_groups_processed,
                total, "state group deletion cancelled"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
