//! Integration tests for layered configuration loading

use crate::integration::test_utils::with_isolated_env;
use std::fs;
use std::path::PathBuf;
use synapse_janitor::config::ConfigLoader;
use synapse_janitor::store::StorageBackend;
use tempfile::TempDir;

const WORKDIR_CONFIG: &str = r#"
[admin]
url = "https://matrix.example.org"
token = "workdir-token"

[database]
url = "postgres://synapse@localhost/synapse"

[storage]
backend = "sled"

[scan]
largest_rooms = 25
"#;

#[test]
fn test_defaults_without_any_file() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let workdir = test_dir.path().join("workdir");
        fs::create_dir_all(&workdir).unwrap();

        let config = ConfigLoader::load(&workdir).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.storage.backend, StorageBackend::Files);
        assert_eq!(config.purge.poll_interval_secs, 5);
        assert!(config.validate().is_err(), "admin and database are required");
    });
}

#[test]
fn test_workdir_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let global_dir = test_dir.path().join("xdg_config").join("synapse-janitor");
        fs::create_dir_all(&global_dir).unwrap();
        fs::write(
            global_dir.join("config.toml"),
            "[admin]\ntoken = \"global-token\"\ntimeout_secs = 30\n",
        )
        .unwrap();
        assert_eq!(
            ConfigLoader::global_config_path().unwrap(),
            global_dir.join("config.toml")
        );

        let workdir = test_dir.path().join("workdir");
        fs::create_dir_all(workdir.join("config")).unwrap();
        fs::write(workdir.join("config").join("config.toml"), WORKDIR_CONFIG).unwrap();

        let config = ConfigLoader::load(&workdir).unwrap();
        assert_eq!(config.admin.token, "workdir-token");
        assert_eq!(config.admin.timeout_secs, 30, "global value kept when not overridden");
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.scan.largest_rooms, 25);
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_env_file_and_variables_win() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let workdir = test_dir.path().join("workdir");
        fs::create_dir_all(workdir.join("config")).unwrap();
        fs::write(workdir.join("config").join("config.toml"), WORKDIR_CONFIG).unwrap();
        fs::write(
            workdir.join("config").join("staging.toml"),
            "[admin]\nurl = \"https://staging.example.org\"\n",
        )
        .unwrap();

        std::env::set_var("JANITOR_ENV", "staging");
        std::env::set_var("JANITOR__ADMIN__TOKEN", "env-token");
        std::env::set_var("JANITOR__SCAN__LARGEST_ROOMS", "3");

        let config = ConfigLoader::load(&workdir).unwrap();
        assert_eq!(config.admin.url, "https://staging.example.org");
        assert_eq!(config.admin.token, "env-token");
        assert_eq!(config.scan.largest_rooms, 3);
    });
}

#[test]
fn test_load_from_explicit_file() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let path = test_dir.path().join("janitor.toml");
        fs::write(&path, WORKDIR_CONFIG).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.admin.token, "workdir-token");
        assert_eq!(config.scheduler.scan_interval_hours, 24);

        let missing = ConfigLoader::load_from_file(&test_dir.path().join("missing.toml"));
        assert!(missing.is_err());
    });
}
