//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a small TOML file. Every field has a
//! built-in default so a missing file never prevents startup.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--root-folder, --config)
//! 2. Environment variables (VTOUR_ROOT_FOLDER, VTOUR_API_KEY)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "VTOUR_ROOT_FOLDER";

/// Environment variable carrying the catalog API key
pub const API_KEY_ENV: &str = "VTOUR_API_KEY";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Folder holding the database file (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Remote photo catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Local store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Remote photo catalog (image search service) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// Error domain reported with unsuccessful responses
    pub domain: String,
    pub api_key: Option<String>,
    pub search_method: String,
    /// Results requested per search page
    pub per_page: u32,
    /// Maximum number of photos kept per album
    pub album_size: usize,
    /// Half width of the search bounding box, in degrees of longitude
    pub bbox_half_width: f64,
    /// Half height of the search bounding box, in degrees of latitude
    pub bbox_half_height: f64,
    pub safe_search: bool,
    pub request_timeout_secs: u64,
    pub max_connections_per_host: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "api.flickr.com".to_string(),
            path: "/services/rest".to_string(),
            domain: "CatalogClient".to_string(),
            api_key: None,
            search_method: "flickr.photos.search".to_string(),
            per_page: 250,
            album_size: 20,
            bbox_half_width: 1.0,
            bbox_half_height: 1.0,
            safe_search: true,
            request_timeout_secs: 30,
            max_connections_per_host: 5,
        }
    }
}

/// Local store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Autosave period in seconds; zero or negative disables autosave
    pub autosave_interval_secs: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_file: "vtour.db".to_string(),
            autosave_interval_secs: 60,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Get default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vtour").join("config.toml"))
}

/// Get OS-dependent default root folder path
pub fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|d| d.join("vtour"))
        .unwrap_or_else(|| PathBuf::from("./vtour_data"))
}

/// Load the TOML bootstrap configuration
///
/// A missing file is not an error: a warning is logged and built-in defaults
/// are returned. A file that exists but cannot be read or parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))?;

    info!("Loaded TOML configuration from {}", path.display());
    Ok(config)
}

/// Write a TOML configuration file, creating the parent folder if needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize TOML: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    get_default_root_folder()
}

/// Resolve the catalog API key
///
/// **Priority:** ENV → TOML
pub fn resolve_api_key(config: &CatalogConfig) -> Result<String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if is_valid_key(&key) {
            info!("Catalog API key loaded from environment variable");
            return Ok(key);
        }
    }

    if let Some(key) = &config.api_key {
        if is_valid_key(key) {
            info!("Catalog API key loaded from TOML config");
            return Ok(key.clone());
        }
    }

    Err(Error::Config(format!(
        "Catalog API key not configured. Set {} or add api_key under [catalog] in {}",
        API_KEY_ENV,
        default_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "config.toml".to_string())
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Ensure the root folder exists and return the database path inside it
pub fn prepare_database_path(root_folder: &Path, store: &StoreConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder)?;
    Ok(root_folder.join(&store.database_file))
}
