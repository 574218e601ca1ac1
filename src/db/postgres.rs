use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use crate::db::{StateGroupId, StateRow, StateStore};
use crate::error::DbError;

/// Postgres-backed [`StateStore`] over a shared connection pool.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and verify the connection with a round trip.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(url)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;
        let store = Self::new(pool);
        store.ping().await?;
        info!(max_connections, "connected to synapse database");
        Ok(store)
    }

    /// Build the pool without connecting; the first query opens a connection.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect_lazy(url)
            .map_err(|e| DbError::Connect(e.to_string()))?;
        debug!(max_connections, "created lazy database pool");
        Ok(Self::new(pool))
    }

    pub async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn state_row_from(row: PgRow) -> Result<StateRow, DbError> {
    let decode = |e: sqlx::Error| DbError::query("decode state_groups_state row", e);
    Ok(StateRow {
        state_group: row.try_get("state_group").map_err(decode)?,
        event_type: row.try_get("type").map_err(decode)?,
        state_key: row.try_get("state_key").map_err(decode)?,
        room_id: row.try_get("room_id").map_err(decode)?,
    })
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn estimated_state_row_count(&self) -> Result<i64, DbError> {
        let row = sqlx::query(
            r#"
            SELECT reltuples::bigint AS estimate
            FROM pg_class
            WHERE oid = 'public.state_groups_state'::regclass
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::query("estimate state_groups_state row count", e))?;

        row.try_get("estimate")
            .map_err(|e| DbError::query("estimate state_groups_state row count", e))
    }

    fn state_rows(&self) -> BoxStream<'_, Result<StateRow, DbError>> {
        sqlx::query("SELECT state_group, type, state_key, room_id FROM state_groups_state")
            .fetch(&self.pool)
            .map(|row| {
                row.map_err(|e| DbError::query("select from state_groups_state", e))
                    .and_then(state_row_from)
            })
            .boxed()
    }

    async fn state_groups_for_room(&self, room_id: &str) -> Result<Vec<StateGroupId>, DbError> {
        let rows = sqlx::query("SELECT id FROM state_groups WHERE room_id = $1")
            .bind(room_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::query("select state_groups by room_id", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("id")
                    .map_err(|e| DbError::query("decode state_groups id", e))
            })
            .collect()
    }

    async fn delete_state_group_rows(&self, state_group: StateGroupId) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM state_groups_state WHERE state_group = $1")
            .bind(state_group)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::query("delete from state_groups_state by state_group", e))?;
        Ok(result.rows_affected())
    }

    async fn delete_state_groups_for_room(&self, room_id: &str) -> Result<u64, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::query("begin state_groups cleanup", e))?;
        let mut rows_deleted = 0u64;

        let edges = sqlx::query(
            r#"
            DELETE FROM state_group_edges
            WHERE state_group IN (SELECT id FROM state_groups WHERE room_id = $1)
            "#,
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("delete state_group_edges by room_id", e))?;
        rows_deleted += edges.rows_affected();

        let mappings = sqlx::query(
            r#"
            DELETE FROM event_to_state_groups
            WHERE state_group IN (SELECT id FROM state_groups WHERE room_id = $1)
            "#,
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DbError::query("delete event_to_state_groups by room_id", e))?;
        rows_deleted += mappings.rows_affected();

        let groups = sqlx::query("DELETE FROM state_groups WHERE room_id = $1")
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::query("delete state_groups by room_id", e))?;
        rows_deleted += groups.rows_affected();

        tx.commit()
            .await
            .map_err(|e| DbError::query("commit state_groups cleanup", e))?;

        debug!(
            room_id = %room_id,
            edges = edges.rows_affected(),
            event_mappings = mappings.rows_affected(),
            state_groups = groups.rows_affected(),
            "deleted state groups for room"
        );
        Ok(rows_deleted)
    }
}
