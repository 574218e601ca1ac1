//! Status Reconciler
//!
//! One room's delete can be reported by several backend shards. Reconciliation folds
//! those reports into a single forward-only status and the union of affected users.

use crate::admin::ShardStatus;
use crate::error::ReconcileError;
use crate::purge::model::Status;
use std::collections::BTreeSet;

/// Result of reconciling one room's shard reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub status: Status,
    /// Kicked and failed-to-kick users, deduplicated and sorted.
    pub affected_users: Vec<String>,
}

/// Fold shard reports into one status.
///
/// The aggregate only moves to a status of equal or higher rank, so the result does
/// not depend on report order. A `failed` aggregate is returned as an error that
/// carries every distinct shard error message.
pub fn reconcile(shards: &[ShardStatus]) -> Result<Reconciliation, ReconcileError> {
    let mut most_complete = Status::Unknown;
    let mut users = BTreeSet::new();
    let mut errors = BTreeSet::new();

    for shard in shards {
        users.extend(shard.shutdown_room.kicked_users.iter().cloned());
        users.extend(shard.shutdown_room.failed_to_kick_users.iter().cloned());
        if let Some(error) = shard.error.as_deref().filter(|e| !e.is_empty()) {
            errors.insert(error.to_string());
        }

        let status = Status::from_shard(&shard.status);
        if status.rank() >= most_complete.rank() {
            most_complete = status;
        }
    }

    if most_complete == Status::Failed {
        let messages: Vec<String> = errors.into_iter().collect();
        return Err(ReconcileError::Failed {
            message: format!("room deletion failed: \n{}", messages.join("\n")),
        });
    }

    Ok(Reconciliation {
        status: most_complete,
        affected_users: users.into_iter().collect(),
    })
}
