//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("admin.timeout_secs", 10)?
        .set_default("storage.data_dir", "data")?
        .set_default("storage.backend", "files")?
        .set_default("purge.poll_interval_secs", 5)?
        .set_default("purge.persist_interval_secs", 5)?
        .set_default("scheduler.scan_interval_hours", 24)?
        .set_default("scheduler.check_interval_secs", 60)
}
