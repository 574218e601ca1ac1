//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, the working
//! directory's `config/` files, then `JANITOR__SECTION__KEY` environment variables.
//! Validation collects every problem instead of stopping at the first.

use crate::logging::LoggingConfig;
use crate::purge::PurgeSettings;
use crate::scan::ScanSettings;
use crate::scheduler::JanitorSettings;
use crate::store::StorageBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub purge: PurgeConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synapse admin API connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Homeserver base URL, e.g. `https://matrix.example.org`
    #[serde(default)]
    pub url: String,

    /// Admin access token
    #[serde(default)]
    pub token: String,

    #[serde(default = "default_admin_timeout_secs")]
    pub timeout_secs: u64,

    /// Message posted to room members when a room is shut down
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_admin_timeout_secs() -> u64 {
    10
}

fn default_message() -> String {
    crate::admin::DEFAULT_PURGE_MESSAGE.to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            timeout_secs: default_admin_timeout_secs(),
            message: default_message(),
        }
    }
}

/// Synapse Postgres database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    4
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Checkpoint storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for checkpoint documents; relative paths resolve against the workdir
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: StorageBackend,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StorageBackend::default(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_data_dir(&self, workdir: &Path) -> PathBuf {
        if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            workdir.join(&self.data_dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default = "default_five")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_five")]
    pub persist_interval_secs: u64,
}

fn default_five() -> u64 {
    5
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_five(),
            persist_interval_secs: default_five(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_progress_every_rows")]
    pub progress_every_rows: u64,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Rooms with more rows than this are reported as large
    #[serde(default = "default_big_room_threshold")]
    pub big_room_threshold: u64,

    #[serde(default = "default_largest_rooms")]
    pub largest_rooms: usize,
}

fn default_channel_capacity() -> usize {
    50_000
}

fn default_progress_every_rows() -> u64 {
    10_000
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

fn default_big_room_threshold() -> u64 {
    10_000
}

fn default_largest_rooms() -> usize {
    10
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            progress_every_rows: default_progress_every_rows(),
            progress_interval_ms: default_progress_interval_ms(),
            big_room_threshold: default_big_room_threshold(),
            largest_rooms: default_largest_rooms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scan_interval_hours")]
    pub scan_interval_hours: u64,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

fn default_scan_interval_hours() -> u64 {
    24
}

fn default_check_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_hours: default_scan_interval_hours(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Admin(String),
    Database(String),
    Storage(String),
    Interval(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Admin(msg) => write!(f, "Admin: {}", msg),
            ValidationError::Database(msg) => write!(f, "Database: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Interval(msg) => write!(f, "Interval: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl JanitorConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match reqwest::Url::parse(&self.admin.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::Admin(format!(
                "URL scheme must be http or https, got '{}'",
                url.scheme()
            ))),
            Err(e) => errors.push(ValidationError::Admin(format!(
                "invalid URL '{}': {}",
                self.admin.url, e
            ))),
        }
        if self.admin.token.trim().is_empty() {
            errors.push(ValidationError::Admin("token cannot be empty".to_string()));
        }

        if self.database.url.trim().is_empty() {
            errors.push(ValidationError::Database("url cannot be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            errors.push(ValidationError::Database(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "data_dir cannot be empty".to_string(),
            ));
        }

        let positive = [
            ("admin.timeout_secs", self.admin.timeout_secs),
            ("database.connect_timeout_secs", self.database.connect_timeout_secs),
            ("purge.poll_interval_secs", self.purge.poll_interval_secs),
            ("purge.persist_interval_secs", self.purge.persist_interval_secs),
            ("scan.channel_capacity", self.scan.channel_capacity as u64),
            ("scan.progress_every_rows", self.scan.progress_every_rows),
            ("scheduler.scan_interval_hours", self.scheduler.scan_interval_hours),
            ("scheduler.check_interval_secs", self.scheduler.check_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                errors.push(ValidationError::Interval(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            channel_capacity: self.scan.channel_capacity,
            progress_every_rows: self.scan.progress_every_rows,
            progress_interval: Duration::from_millis(self.scan.progress_interval_ms),
        }
    }

    pub fn purge_settings(&self) -> PurgeSettings {
        PurgeSettings {
            poll_interval: Duration::from_secs(self.purge.poll_interval_secs),
            persist_interval: Duration::from_secs(self.purge.persist_interval_secs),
            message: self.admin.message.clone(),
        }
    }

    pub fn janitor_settings(&self) -> JanitorSettings {
        JanitorSettings {
            scan: self.scan_settings(),
            purge: self.purge_settings(),
            scan_interval: Duration::from_secs(self.scheduler.scan_interval_hours * 60 * 60),
            check_interval: Duration::from_secs(self.scheduler.check_interval_secs),
        }
    }
}
