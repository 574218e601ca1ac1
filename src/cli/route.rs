//! CLI route: single route table and run context. Dispatches to the janitor facade and
//! presentation.

use crate::admin::SynapseAdminClient;
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_progress_json, format_progress_text, format_purge_outcome, format_room_report_json,
    format_room_report_text, format_verify_result,
};
use crate::config::{ConfigLoader, JanitorConfig};
use crate::db::postgres::PostgresStateStore;
use crate::error::JanitorError;
use crate::purge::RoomToPurge;
use crate::scan::RowCountByRoom;
use crate::scheduler::Janitor;
use crate::store::CheckpointStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runtime context for CLI execution: loaded config plus the janitor facade.
pub struct RunContext {
    config: JanitorConfig,
    database: PostgresStateStore,
    janitor: Janitor,
}

impl RunContext {
    /// Load and validate config, open checkpoints and build the adapters. The
    /// database pool connects on first use.
    pub fn new(
        workdir: PathBuf,
        config_path: Option<PathBuf>,
        shutdown: CancellationToken,
    ) -> Result<Self, JanitorError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workdir)?,
        };
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            JanitorError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;

        let data_dir = config.storage.resolve_data_dir(&workdir);
        let checkpoints = CheckpointStore::open(&data_dir, config.storage.backend)?;

        let admin = SynapseAdminClient::new(
            &config.admin.url,
            config.admin.token.clone(),
            Duration::from_secs(config.admin.timeout_secs),
        )?;
        let database = PostgresStateStore::connect_lazy(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.connect_timeout_secs),
        )?;

        let janitor = Janitor::new(
            Arc::new(admin),
            Arc::new(database.clone()),
            checkpoints,
            config.janitor_settings(),
            shutdown,
        );
        info!(data_dir = %data_dir.display(), backend = ?config.storage.backend, "janitor ready");

        Ok(Self {
            config,
            database,
            janitor,
        })
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, JanitorError> {
        match command {
            Commands::Scan { format } => self.handle_scan(format).await,
            Commands::Rooms {
                threshold,
                limit,
                names,
                format,
            } => self.handle_rooms(*threshold, *limit, *names, format).await,
            Commands::Purge { rooms, ban, yes } => self.handle_purge(rooms, *ban, *yes).await,
            Commands::Resume => self.handle_resume().await,
            Commands::Status { format } => self.handle_status(format),
            Commands::Verify { rooms } => self.handle_verify(rooms).await,
            Commands::Run => self.handle_run().await,
        }
    }

    async fn handle_scan(&self, format: &str) -> Result<String, JanitorError> {
        self.database.ping().await?;
        let counts = self.janitor.scan_and_save().await?;
        self.render_report(&counts, None, None, false, format).await
    }

    async fn handle_rooms(
        &self,
        threshold: Option<u64>,
        limit: Option<usize>,
        names: bool,
        format: &str,
    ) -> Result<String, JanitorError> {
        match self.janitor.saved_row_counts()? {
            Some(counts) => self.render_report(&counts, threshold, limit, names, format).await,
            None => Ok("No scan saved yet; run `janitor scan` first.".to_string()),
        }
    }

    async fn render_report(
        &self,
        counts: &RowCountByRoom,
        threshold: Option<u64>,
        limit: Option<usize>,
        names: bool,
        format: &str,
    ) -> Result<String, JanitorError> {
        let threshold = threshold.unwrap_or(self.config.scan.big_room_threshold);
        let limit = limit.unwrap_or(self.config.scan.largest_rooms);
        let mut report = counts.largest_rooms(threshold, limit);
        if names {
            self.janitor.label_rooms(&mut report).await;
        }
        if format == "json" {
            format_room_report_json(&report)
        } else {
            Ok(format_room_report_text(&report, threshold))
        }
    }

    async fn handle_purge(&self, rooms: &[String], ban: bool, yes: bool) -> Result<String, JanitorError> {
        if !yes {
            use dialoguer::Confirm;
            let verb = if ban { "Purge and block" } else { "Purge" };
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "{} {} room(s)? Their history is deleted for good.",
                    verb,
                    rooms.len()
                ))
                .default(false)
                .interact()
                .map_err(|e| JanitorError::Prompt(e.to_string()))?;
            if !confirmed {
                return Ok("Purge cancelled".to_string());
            }
        }

        self.database.ping().await?;
        let rooms = rooms
            .iter()
            .map(|room_id| RoomToPurge::new(room_id.clone(), ban))
            .collect();
        let handle = self.janitor.start_purge(rooms).await?;
        let outcome = handle.wait().await?;
        Ok(format_purge_outcome(&outcome))
    }

    async fn handle_resume(&self) -> Result<String, JanitorError> {
        if self.janitor.pending_purge()?.is_none() {
            return Ok("No purge in progress.".to_string());
        }
        self.database.ping().await?;
        match self.janitor.resume_purge_if_pending().await? {
            Some(handle) => Ok(format_purge_outcome(&handle.wait().await?)),
            None => Ok("No purge in progress.".to_string()),
        }
    }

    fn handle_status(&self, format: &str) -> Result<String, JanitorError> {
        let progress = self.janitor.pending_purge()?;
        if format == "json" {
            format_progress_json(progress.as_ref())
        } else {
            Ok(format_progress_text(progress.as_ref()))
        }
    }

    async fn handle_verify(&self, rooms: &[String]) -> Result<String, JanitorError> {
        self.database.ping().await?;
        let remaining = self.janitor.verify_rooms(rooms).await?;
        Ok(format_verify_result(rooms, &remaining))
    }

    async fn handle_run(&self) -> Result<String, JanitorError> {
        self.database.ping().await?;
        self.janitor.run().await?;
        Ok("Scheduler stopped".to_string())
    }
}
