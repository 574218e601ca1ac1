//! Persisted purge-run data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Deletion status of one room, ordered by how far deletion has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unknown,
    ShuttingDown,
    Purging,
    Failed,
    Complete,
}

impl Status {
    /// Forward-only rank: a status may only be replaced by one of equal or higher rank.
    pub fn rank(self) -> u8 {
        match self {
            Status::Unknown => 0,
            Status::ShuttingDown => 1,
            Status::Purging => 2,
            Status::Failed => 3,
            Status::Complete => 4,
        }
    }

    /// Parse a shard status string. Anything unrecognised is `Unknown`.
    pub fn from_shard(status: &str) -> Self {
        match status {
            "shutting_down" => Status::ShuttingDown,
            "purging" => Status::Purging,
            "failed" => Status::Failed,
            "complete" => Status::Complete,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::ShuttingDown => "shutting_down",
            Status::Purging => "purging",
            Status::Failed => "failed",
            Status::Complete => "complete",
        }
    }

    pub fn is_complete(self) -> bool {
        self == Status::Complete
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A room an operator asked to purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomToPurge {
    pub room_id: String,
    /// Block the room so users cannot re-join it.
    #[serde(default)]
    pub ban: bool,
}

impl RoomToPurge {
    pub fn new(room_id: impl Into<String>, ban: bool) -> Self {
        Self {
            room_id: room_id.into(),
            ban,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomPurgeEntry {
    pub room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub ban: bool,
    #[serde(default)]
    pub status: Status,
    /// Set once the admin API accepted the delete request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_users: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoomPurgeEntry {
    pub fn new(room: RoomToPurge, name: Option<String>) -> Self {
        Self {
            room_id: room.room_id,
            name,
            ban: room.ban,
            ..Self::default()
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.delete_id.is_some()
    }

    /// Apply a newly observed status. A `complete` room never regresses.
    pub fn advance(&mut self, status: Status) -> bool {
        if status.rank() >= self.status.rank() && status != self.status {
            self.status = status;
            return true;
        }
        false
    }
}

/// Everything needed to resume an interrupted purge run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PurgeProgress {
    #[serde(default)]
    pub rooms: Vec<RoomPurgeEntry>,
    /// Percentage (0-100) of state groups whose `state_groups_state` rows are gone.
    #[serde(default)]
    pub state_groups_state_progress: u8,
    /// Resume index into the ascending state-group list.
    #[serde(default)]
    pub state_groups_deleted: usize,
    #[serde(default)]
    pub state_group_count: usize,
    #[serde(default)]
    pub rows_deleted: u64,
    #[serde(default)]
    pub delete_errors: u64,
}

impl PurgeProgress {
    pub fn new(rooms: Vec<RoomPurgeEntry>) -> Self {
        Self {
            rooms,
            ..Self::default()
        }
    }

    /// No rooms means there is nothing to resume.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn all_complete(&self) -> bool {
        self.rooms.iter().all(|room| room.status.is_complete())
    }

    pub fn pending_rooms(&self) -> usize {
        self.rooms
            .iter()
            .filter(|room| !room.status.is_complete())
            .count()
    }

    pub fn record_state_group_progress(&mut self, processed: usize, total: usize) {
        self.state_groups_deleted = processed;
        self.state_group_count = total;
        self.state_groups_state_progress = percent(processed, total);
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

/// Record of the last completed scheduled scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduledTaskRecord {
    #[serde(default)]
    pub last_completed_at_ms: Option<u64>,
}
