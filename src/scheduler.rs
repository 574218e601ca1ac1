//! Janitor facade and scheduler
//!
//! [`Janitor`] is the single entry point the CLI and the scheduler use. It owns the
//! adapters, guards against overlapping scans or purges with a [`TaskRegistry`], and
//! runs the periodic scan loop.

use crate::admin::RoomAdminApi;
use crate::db::StateStore;
use crate::error::{JanitorError, PurgeError};
use crate::purge::{
    PurgeOrchestrator, PurgeOutcome, PurgeProgress, PurgeSettings, RoomPurgeEntry, RoomToPurge,
    ScheduledTaskRecord,
};
use crate::scan::{RowCountByRoom, RowCountScanner, RoomSizeReport, ScanSettings, ScanStream};
use crate::store::{
    CheckpointStore, LAST_SCHEDULED_TASK_KEY, PURGE_PROGRESS_KEY, ROW_COUNT_BY_ROOM_KEY,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kinds of long-running work that must not overlap with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Scan,
    Purge,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Scan => write!(f, "scan"),
            TaskKind::Purge => write!(f, "purge"),
        }
    }
}

/// Running flags, one per [`TaskKind`].
#[derive(Debug, Default)]
pub struct TaskRegistry {
    scan: AtomicBool,
    purge: AtomicBool,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn flag(&self, kind: TaskKind) -> &AtomicBool {
        match kind {
            TaskKind::Scan => &self.scan,
            TaskKind::Purge => &self.purge,
        }
    }

    /// Claim `kind`, failing with [`JanitorError::AlreadyRunning`] when it is held.
    pub fn try_claim(self: &Arc<Self>, kind: TaskKind) -> Result<TaskGuard, JanitorError> {
        self.flag(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| JanitorError::AlreadyRunning(kind))?;
        debug!(task = %kind, "task claimed");
        Ok(TaskGuard {
            registry: Arc::clone(self),
            kind,
        })
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }
}

/// Releases its claim when dropped.
#[derive(Debug)]
pub struct TaskGuard {
    registry: Arc<TaskRegistry>,
    kind: TaskKind,
}

impl TaskGuard {
    pub fn kind(&self) -> TaskKind {
        self.kind
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.flag(self.kind).store(false, Ordering::Release);
        debug!(task = %self.kind, "task released");
    }
}

/// A scan holding the scan claim until it is drained or dropped.
pub struct RunningScan {
    stream: ScanStream,
    _guard: TaskGuard,
}

impl RunningScan {
    pub fn estimated_total(&self) -> i64 {
        self.stream.estimated_total
    }

    pub async fn next_row(&mut self) -> Option<crate::db::StateRow> {
        self.stream.next_row().await
    }

    pub async fn collect_counts(self) -> Result<RowCountByRoom, JanitorError> {
        let RunningScan { stream, _guard } = self;
        stream.collect_counts().await
    }
}

/// A purge running on a background task.
pub struct PurgeHandle {
    cancel: CancellationToken,
    handle: JoinHandle<Result<PurgeOutcome, PurgeError>>,
}

impl PurgeHandle {
    /// Ask the run to stop at the next wait point. The checkpoint is kept.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<PurgeOutcome, JanitorError> {
        let outcome = self
            .handle
            .await
            .map_err(|e| PurgeError::Task(e.to_string()))??;
        Ok(outcome)
    }
}

/// Facade settings.
#[derive(Debug, Clone)]
pub struct JanitorSettings {
    pub scan: ScanSettings,
    pub purge: PurgeSettings,
    /// Time between scheduled scans
    pub scan_interval: Duration,
    /// How often the scheduler checks whether a scan is due
    pub check_interval: Duration,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            scan: ScanSettings::default(),
            purge: PurgeSettings::default(),
            scan_interval: Duration::from_secs(24 * 60 * 60),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Whether a scheduled scan is due at `now_ms`.
pub fn scan_due(record: &ScheduledTaskRecord, now_ms: u64, interval: Duration) -> bool {
    match record.last_completed_at_ms {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= interval.as_millis() as u64,
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Clone)]
pub struct Janitor {
    admin: Arc<dyn RoomAdminApi>,
    store: Arc<dyn StateStore>,
    checkpoints: CheckpointStore,
    settings: JanitorSettings,
    tasks: Arc<TaskRegistry>,
    shutdown: CancellationToken,
}

impl Janitor {
    /// Every task started from this janitor is cancelled with `shutdown`.
    pub fn new(
        admin: Arc<dyn RoomAdminApi>,
        store: Arc<dyn StateStore>,
        checkpoints: CheckpointStore,
        settings: JanitorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            admin,
            store,
            checkpoints,
            settings,
            tasks: TaskRegistry::new(),
            shutdown,
        }
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Start a full row-count scan.
    pub async fn start_scan(&self) -> Result<RunningScan, JanitorError> {
        let guard = self.tasks.try_claim(TaskKind::Scan)?;
        let scanner = RowCountScanner::new(Arc::clone(&self.store), self.settings.scan.clone());
        let stream = scanner.start(self.shutdown.child_token()).await?;
        Ok(RunningScan {
            stream,
            _guard: guard,
        })
    }

    /// Save a new progress document for `rooms` and start purging them.
    ///
    /// Duplicate room ids are dropped, keeping the first. Refuses to replace a
    /// purge that has not finished yet.
    pub async fn start_purge(&self, rooms: Vec<RoomToPurge>) -> Result<PurgeHandle, JanitorError> {
        if rooms.is_empty() {
            return Err(JanitorError::NoRooms);
        }
        let guard = self.tasks.try_claim(TaskKind::Purge)?;

        if self.pending_purge()?.is_some() {
            return Err(JanitorError::PurgePending);
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(rooms.len());
        for room in rooms {
            if !seen.insert(room.room_id.clone()) {
                continue;
            }
            let name = match self.admin.room_name(&room.room_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(room_id = %room.room_id, error = %e, "could not look up room name");
                    None
                }
            };
            entries.push(RoomPurgeEntry::new(room, name));
        }

        let progress = PurgeProgress::new(entries);
        self.checkpoints.save(PURGE_PROGRESS_KEY, &progress)?;
        info!(rooms = progress.rooms.len(), "purge queued");

        Ok(self.spawn_purge(guard))
    }

    /// Resume the saved purge, if there is one.
    pub async fn resume_purge_if_pending(&self) -> Result<Option<PurgeHandle>, JanitorError> {
        if self.pending_purge()?.is_none() {
            return Ok(None);
        }
        let guard = self.tasks.try_claim(TaskKind::Purge)?;
        info!("resuming pending purge");
        Ok(Some(self.spawn_purge(guard)))
    }

    fn spawn_purge(&self, guard: TaskGuard) -> PurgeHandle {
        let cancel = self.shutdown.child_token();
        let orchestrator = PurgeOrchestrator::new(
            Arc::clone(&self.admin),
            Arc::clone(&self.store),
            self.checkpoints.clone(),
            self.settings.purge.clone(),
        );
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run(token).await
        });
        PurgeHandle { cancel, handle }
    }

    /// The saved progress document when a purge has not finished.
    pub fn pending_purge(&self) -> Result<Option<PurgeProgress>, JanitorError> {
        let (progress, found): (PurgeProgress, bool) = self.checkpoints.load(PURGE_PROGRESS_KEY)?;
        Ok((found && !progress.is_empty()).then_some(progress))
    }

    /// The most recent saved row-count snapshot.
    pub fn saved_row_counts(&self) -> Result<Option<RowCountByRoom>, JanitorError> {
        let (counts, found): (RowCountByRoom, bool) =
            self.checkpoints.load(ROW_COUNT_BY_ROOM_KEY)?;
        Ok(found.then_some(counts))
    }

    pub fn last_scheduled_task(&self) -> Result<ScheduledTaskRecord, JanitorError> {
        let (record, _): (ScheduledTaskRecord, bool) =
            self.checkpoints.load(LAST_SCHEDULED_TASK_KEY)?;
        Ok(record)
    }

    /// Scan now and save the snapshot.
    pub async fn scan_and_save(&self) -> Result<RowCountByRoom, JanitorError> {
        let counts = self.start_scan().await?.collect_counts().await?;
        self.checkpoints.save(ROW_COUNT_BY_ROOM_KEY, &counts)?;
        Ok(counts)
    }

    /// Scan, save the snapshot, and record the scan as the last scheduled task.
    pub async fn run_scheduled_scan(&self) -> Result<RowCountByRoom, JanitorError> {
        let counts = self.scan_and_save().await?;
        let record = ScheduledTaskRecord {
            last_completed_at_ms: Some(now_ms()),
        };
        self.checkpoints.save(LAST_SCHEDULED_TASK_KEY, &record)?;
        info!(rooms = counts.len(), rows = counts.total(), "scheduled scan finished");
        Ok(counts)
    }

    /// Fill in display names for the rooms of a size report. Lookup failures leave
    /// the name empty.
    pub async fn label_rooms(&self, report: &mut RoomSizeReport) {
        for room in &mut report.rooms {
            match self.admin.room_name(&room.room_id).await {
                Ok(name) => room.name = name,
                Err(e) => debug!(room_id = %room.room_id, error = %e, "room name lookup failed"),
            }
        }
    }

    /// Scan and report rows still present for `room_ids`.
    pub async fn verify_rooms(&self, room_ids: &[String]) -> Result<Vec<(String, u64)>, JanitorError> {
        let counts = self.scan_and_save().await?;
        Ok(counts.remaining_rows(room_ids.iter().map(String::as_str)))
    }

    /// Run the scheduler until the shutdown token fires.
    pub async fn run(&self) -> Result<(), JanitorError> {
        info!(
            scan_interval_secs = self.settings.scan_interval.as_secs(),
            check_interval_secs = self.settings.check_interval.as_secs(),
            "scheduler started"
        );

        // The first tick fires immediately, so a pending purge resumes at startup.
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.retry_pending_purge().await;
            if let Err(e) = self.start_scheduled_scan_if_due() {
                warn!(error = %e, "scheduled scan check failed");
            }
        }

        info!("scheduler stopped");
        Ok(())
    }

    /// Resume a purge left pending by a restart or a failed run. Runs on every
    /// scheduler tick while no purge is running.
    async fn retry_pending_purge(&self) {
        if self.tasks.is_running(TaskKind::Purge) {
            return;
        }
        match self.resume_purge_if_pending().await {
            Ok(Some(handle)) => {
                tokio::spawn(log_purge_outcome(handle));
            }
            Ok(None) => {}
            Err(JanitorError::AlreadyRunning(_)) => {}
            Err(e) => warn!(error = %e, "could not resume pending purge"),
        }
    }

    /// Start a background scan when one is due and nothing else is running.
    pub fn start_scheduled_scan_if_due(&self) -> Result<bool, JanitorError> {
        if self.tasks.is_running(TaskKind::Scan) {
            debug!("scan already running");
            return Ok(false);
        }
        if self.tasks.is_running(TaskKind::Purge) {
            debug!("purge running, scheduled scan deferred");
            return Ok(false);
        }
        let record = self.last_scheduled_task()?;
        if !scan_due(&record, now_ms(), self.settings.scan_interval) {
            return Ok(false);
        }

        info!("starting scheduled scan");
        let janitor = self.clone();
        tokio::spawn(async move {
            match janitor.run_scheduled_scan().await {
                Ok(_) => {}
                Err(JanitorError::AlreadyRunning(kind)) => {
                    debug!(task = %kind, "scheduled scan skipped")
                }
                Err(JanitorError::Cancelled) => info!("scheduled scan cancelled"),
                Err(e) => error!(error = %e, "scheduled scan failed"),
            }
        });
        Ok(true)
    }
}

async fn log_purge_outcome(handle: PurgeHandle) {
    match handle.wait().await {
        Ok(PurgeOutcome::Completed(summary)) => info!(
            rooms = summary.rooms,
            rows_deleted = summary.rows_deleted,
            "resumed purge finished"
        ),
        Ok(PurgeOutcome::Cancelled) => info!("resumed purge cancelled; checkpoint kept"),
        Ok(PurgeOutcome::NothingToDo) => {}
        Err(e) => error!(error = %e, "resumed purge failed"),
    }
}
