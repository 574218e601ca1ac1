//! Error types for the Synapse janitor.

use thiserror::Error;

use crate::scheduler::TaskKind;

/// Checkpoint / document storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Document '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("Document '{key}' could not be serialized: {message}")]
    Serialize { key: String, message: String },
}

/// Errors talking to the Synapse admin API
#[derive(Debug, Error)]
pub enum AdminApiError {
    #[error("{operation} '{room_id}' failed: {message}")]
    Request {
        operation: &'static str,
        room_id: String,
        message: String,
    },

    #[error("{operation} '{room_id}' returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        room_id: String,
        status: u16,
        body: String,
    },

    #[error("{operation} '{room_id}' response could not be parsed: {message}")]
    Decode {
        operation: &'static str,
        room_id: String,
        message: String,
    },

    #[error("Invalid admin API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Relational store errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Could not connect to database: {0}")]
    Connect(String),

    #[error("{operation} failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
}

impl DbError {
    pub fn query(operation: &'static str, err: impl std::fmt::Display) -> Self {
        DbError::Query {
            operation,
            message: err.to_string(),
        }
    }
}

/// Reconciling shard statuses produced a `failed` verdict
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("{message}")]
    Failed { message: String },
}

/// Errors that stop a purge run. The last saved checkpoint stays on disk.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Submitting delete for room '{room_id}' failed: {source}")]
    Submit {
        room_id: String,
        #[source]
        source: AdminApiError,
    },

    #[error("Polling delete status for room '{room_id}' failed: {source}")]
    Poll {
        room_id: String,
        #[source]
        source: AdminApiError,
    },

    #[error("Deletion of room '{room_id}' failed: {message}")]
    RoomFailed { room_id: String, message: String },

    #[error("Looking up state groups for room '{room_id}' failed: {source}")]
    Lookup {
        room_id: String,
        #[source]
        source: DbError,
    },

    #[error("Deleting state groups for room '{room_id}' failed: {source}")]
    Cleanup {
        room_id: String,
        #[source]
        source: DbError,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] StorageError),

    #[error("Purge task stopped unexpectedly: {0}")]
    Task(String),
}

/// Top-level errors surfaced by the facade and the CLI
#[derive(Debug, Error)]
pub enum JanitorError {
    #[error("A {0} task is already running")]
    AlreadyRunning(TaskKind),

    #[error("A purge is already pending; run `janitor resume` or wait for it to finish")]
    PurgePending,

    #[error("No rooms were given to purge")]
    NoRooms,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scan was cancelled")]
    Cancelled,

    #[error("Background {0} task stopped unexpectedly: {1}")]
    Task(TaskKind, String),

    #[error("Failed to format output: {0}")]
    Output(String),

    #[error("Failed to get user input: {0}")]
    Prompt(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Admin(#[from] AdminApiError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Purge(#[from] PurgeError),
}

impl From<config::ConfigError> for JanitorError {
    fn from(err: config::ConfigError) -> Self {
        JanitorError::Config(err.to_string())
    }
}
