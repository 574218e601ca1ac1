//! Relational store
//!
//! The Synapse database tables the janitor reads and prunes: `state_groups_state`
//! (fine-grained state rows), `state_groups`, `state_group_edges` and
//! `event_to_state_groups`.

pub mod postgres;

pub use postgres::PostgresStateStore;

use crate::error::DbError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Opaque, monotonically assigned state-group identifier.
pub type StateGroupId = i64;

/// One row of `state_groups_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRow {
    pub state_group: StateGroupId,
    pub event_type: String,
    pub state_key: String,
    pub room_id: String,
}

/// Storage operations the scanner and purge pipeline rely on.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Planner estimate of the `state_groups_state` row count. Approximate only.
    async fn estimated_state_row_count(&self) -> Result<i64, DbError>;

    /// Stream every `state_groups_state` row. Row-level errors are yielded in place
    /// and do not end the stream.
    fn state_rows(&self) -> BoxStream<'_, Result<StateRow, DbError>>;

    async fn state_groups_for_room(&self, room_id: &str) -> Result<Vec<StateGroupId>, DbError>;

    /// Delete the `state_groups_state` rows of one state group. Returns rows affected;
    /// an unknown state group affects zero rows.
    async fn delete_state_group_rows(&self, state_group: StateGroupId) -> Result<u64, DbError>;

    /// Delete a room's state-group edges, event mappings and state groups, edges first.
    async fn delete_state_groups_for_room(&self, room_id: &str) -> Result<u64, DbError>;
}
