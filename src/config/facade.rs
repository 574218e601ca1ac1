//! Config loading entry points.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::JanitorConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for `workdir`.
    ///
    /// Later sources win: defaults, global file, `config/config.toml`,
    /// `config/{JANITOR_ENV}.toml`, environment.
    pub fn load(workdir: &Path) -> Result<JanitorConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workdir)?;
        builder
            .add_source(environment::source())
            .build()?
            .try_deserialize()
    }

    /// Load from one explicit file, still honouring environment overrides.
    pub fn load_from_file(path: &Path) -> Result<JanitorConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .add_source(environment::source())
            .build()?
            .try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
