//! Resumable room purge pipeline

pub mod batch;
pub mod model;
pub mod orchestrator;
pub mod reconcile;

pub use batch::{DeleteStatus, StateGroupBatchDeleter};
pub use model::{PurgeProgress, RoomPurgeEntry, RoomToPurge, ScheduledTaskRecord, Status};
pub use orchestrator::{PurgeOrchestrator, PurgeOutcome, PurgeSettings, PurgeSummary};
pub use reconcile::{reconcile, Reconciliation};
