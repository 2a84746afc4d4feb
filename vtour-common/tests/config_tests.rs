//! Tests for configuration loading and resolution
//!
//! - Missing TOML files SHALL NOT cause termination
//! - Priority order for root folder resolution (CLI > ENV > TOML > default)
//! - API key resolution (ENV > TOML)
//!
//! Tests that manipulate VTOUR_* environment variables are marked with
//! #[serial] so they run sequentially.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vtour_common::config::{
    get_default_root_folder, load_toml_config, prepare_database_path, resolve_api_key,
    resolve_root_folder, write_toml_config, TomlConfig, API_KEY_ENV, ROOT_FOLDER_ENV,
};

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();

    assert!(config.root_folder.is_none());
    assert_eq!(config.catalog.album_size, 20);
    assert_eq!(config.store.autosave_interval_secs, 60);
}

#[test]
fn test_malformed_config_file_is_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[catalog\nper_page = ").unwrap();

    let result = load_toml_config(&path);
    assert!(result.is_err());
}

#[test]
fn test_config_write_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("vtour").join("config.toml");

    let mut config = TomlConfig::default();
    config.catalog.api_key = Some("written-key".to_string());
    config.store.autosave_interval_secs = -1;
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.catalog.api_key.as_deref(), Some("written-key"));
    assert_eq!(loaded.store.autosave_interval_secs, -1);
}

#[test]
#[serial]
fn test_root_folder_cli_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vtour-env-folder");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vtour-toml-folder")),
        ..Default::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/vtour-cli-folder")), &config);
    assert_eq!(resolved, PathBuf::from("/tmp/vtour-cli-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_root_folder_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/vtour-env-folder");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vtour-toml-folder")),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/tmp/vtour-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_root_folder_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/vtour-toml-folder")),
        ..Default::default()
    };
    assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/tmp/vtour-toml-folder"));

    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert_eq!(resolved, get_default_root_folder());
}

#[test]
#[serial]
fn test_api_key_env_beats_toml() {
    env::set_var(API_KEY_ENV, "env-key");
    let mut config = TomlConfig::default();
    config.catalog.api_key = Some("toml-key".to_string());

    assert_eq!(resolve_api_key(&config.catalog).unwrap(), "env-key");

    env::remove_var(API_KEY_ENV);
    assert_eq!(resolve_api_key(&config.catalog).unwrap(), "toml-key");
}

#[test]
#[serial]
fn test_api_key_missing_is_config_error() {
    env::remove_var(API_KEY_ENV);
    let mut config = TomlConfig::default();
    config.catalog.api_key = Some("   ".to_string());

    let err = resolve_api_key(&config.catalog).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_prepare_database_path_creates_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let config = TomlConfig::default();

    let db_path = prepare_database_path(&root, &config.store).unwrap();

    assert!(root.is_dir());
    assert_eq!(db_path, root.join("vtour.db"));
}
