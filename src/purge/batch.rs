//! State-Group Batch Deleter
//!
//! Deletes `state_groups_state` rows one state group at a time, strictly in the order
//! given, and reports a running [`DeleteStatus`] after every id. Per-id failures are
//! counted and skipped; deleting rows of an absent state group affects zero rows.

use crate::db::{StateGroupId, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Running totals after each processed state group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteStatus {
    /// Ids processed so far, counted from the start of the list. This is the resume
    /// index for the next run.
    pub state_groups_processed: usize,
    /// Rows deleted by this run.
    pub rows_deleted: u64,
    /// Ids whose delete failed in this run.
    pub errors: u64,
}

pub struct StateGroupBatchDeleter {
    store: Arc<dyn StateStore>,
}

impl StateGroupBatchDeleter {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Delete `ids[resume_from..]` in order on a background task.
    ///
    /// The status channel is unbounded so the deleter never waits on a slow reader.
    /// Cancellation is checked between ids; the last status sent tells the caller how
    /// far it got.
    pub fn delete(
        &self,
        ids: Arc<[StateGroupId]>,
        resume_from: usize,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<DeleteStatus>, JoinHandle<DeleteStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Arc::clone(&self.store);

        let handle = tokio::spawn(async move {
            let mut status = DeleteStatus {
                state_groups_processed: resume_from.min(ids.len()),
                ..DeleteStatus::default()
            };

            for (index, state_group) in ids.iter().enumerate().skip(resume_from) {
                if cancel.is_cancelled() {
                    debug!(index, "state group deletion cancelled");
                    break;
                }

                match store.delete_state_group_rows(*state_group).await {
                    Ok(affected) => status.rows_deleted += affected,
                    Err(e) => {
                        warn!(
                            state_group = *state_group,
                            error = %e,
                            "could not delete from state_groups_state by state_group"
                        );
                        status.errors += 1;
                    }
                }
                status.state_groups_processed = index + 1;

                if tx.send(status).is_err() {
                    // Nobody is listening any more; the work itself is still valid.
                    debug!(index, "delete status receiver dropped");
                }
            }
            status
        });

        (rx, handle)
    }
}
