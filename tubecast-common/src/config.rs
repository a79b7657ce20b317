//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every section is
//! optional; a missing file or a missing key falls back to built-in defaults
//! so a fresh install starts without any setup beyond storage credentials.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TUBECAST_ROOT_FOLDER` environment variable
//! 3. `root_folder` key in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TUBECAST_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "TUBECAST_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder for snapshots, feeds and staged media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub owner: OwnerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
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

/// Which remote storage backend publishes media and feeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Public archival service driven through the `ia` command-line tool
    #[default]
    Archive,
    /// Consumer cloud storage driven through its HTTP API
    Dropbox,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Archive => write!(f, "archive"),
            BackendKind::Dropbox => write!(f, "dropbox"),
        }
    }
}

/// Remote storage configuration
///
/// Secrets may also come from the environment; see the engine's
/// configuration resolution for the precedence rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Archive item identifier that holds every uploaded object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox_app_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox_app_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox_refresh_token: Option<String>,
}

/// Per-show storage ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Maximum remote bytes per show, in MiB
    #[serde(default = "default_max_storage_mib")]
    pub max_storage_mib: u64,
}

impl QuotaConfig {
    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_mib.saturating_mul(1024 * 1024)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_storage_mib: default_max_storage_mib(),
        }
    }
}

/// Subscription polling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How many of a channel's most recent items each sync considers
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Deadline covering one whole add-item or sync-channel operation
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl SyncConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

/// Attribution written into every show's feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerConfig {
    #[serde(default = "default_owner_name")]
    pub name: String,

    #[serde(default)]
    pub email: String,

    /// Used as the feed copyright holder
    #[serde(default = "default_owner_username")]
    pub username: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            name: default_owner_name(),
            email: String::new(),
            username: default_owner_username(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_storage_mib() -> u64 {
    2048
}

fn default_recent_limit() -> usize {
    1
}

fn default_operation_timeout_secs() -> u64 {
    300
}

fn default_owner_name() -> String {
    "TubeCast".to_string()
}

fn default_owner_username() -> String {
    "tubecast".to_string()
}

impl TomlConfig {
    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<()> {
        if self.quota.max_storage_mib == 0 {
            return Err(Error::Config(
                "quota.max_storage_mib must be greater than zero".to_string(),
            ));
        }
        if self.sync.recent_limit == 0 {
            return Err(Error::Config(
                "sync.recent_limit must be greater than zero".to_string(),
            ));
        }
        if self.sync.operation_timeout_secs == 0 {
            return Err(Error::Config(
                "sync.operation_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load bootstrap config from `path`
///
/// A missing file is not an error: a warning is logged and defaults are
/// returned. A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                path = %path.display(),
                "Config file not found, using built-in defaults"
            );
            return Ok(TomlConfig::default());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Write bootstrap config atomically
pub async fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;
    crate::fs::write_atomic(path, content.as_bytes()).await?;
    Ok(())
}

/// Config file location: CLI argument → environment → per-user default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    default_config_path()
}

/// Per-user config file default (`~/.config/tubecast/config.toml` on Linux)
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("tubecast").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("tubecast.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tubecast"))
        .unwrap_or_else(|| PathBuf::from("./tubecast_data"))
}

/// Root folder resolver applying the documented priority order
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            config_value: config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.config_value {
            return path.clone();
        }

        default_root_folder()
    }
}
