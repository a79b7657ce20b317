//! Configuration resolution for the tubecast engine
//!
//! Backend credentials resolve with ENV → TOML priority; everything else comes
//! from the TOML file (or its defaults).

use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tubecast_common::config::{OwnerConfig, StorageConfig, TomlConfig};
use tubecast_common::{Error, Result};

pub const ARCHIVE_ID_ENV: &str = "TUBECAST_ARCHIVE_ID";
pub const DROPBOX_APP_KEY_ENV: &str = "DROPBOX_APP_KEY";
pub const DROPBOX_APP_SECRET_ENV: &str = "DROPBOX_APP_SECRET";
pub const DROPBOX_REFRESH_TOKEN_ENV: &str = "DROPBOX_REFRESH_TOKEN";

/// Resolved storage backend credentials
#[derive(Debug, Clone, Default)]
pub struct BackendSecrets {
    pub archive_id: Option<String>,
    pub dropbox_app_key: Option<String>,
    pub dropbox_app_secret: Option<String>,
    pub dropbox_refresh_token: Option<String>,
}

impl BackendSecrets {
    /// Resolve every credential from the environment, then the TOML file
    pub fn resolve(storage: &StorageConfig) -> Self {
        Self {
            archive_id: resolve_secret(ARCHIVE_ID_ENV, storage.archive_id.as_deref()),
            dropbox_app_key: resolve_secret(
                DROPBOX_APP_KEY_ENV,
                storage.dropbox_app_key.as_deref(),
            ),
            dropbox_app_secret: resolve_secret(
                DROPBOX_APP_SECRET_ENV,
                storage.dropbox_app_secret.as_deref(),
            ),
            dropbox_refresh_token: resolve_secret(
                DROPBOX_REFRESH_TOKEN_ENV,
                storage.dropbox_refresh_token.as_deref(),
            ),
        }
    }
}

/// Resolve one credential
///
/// **Priority:** ENV → TOML. Both being set is logged.
pub fn resolve_secret(env_name: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_name).ok().filter(|v| is_valid_secret(v));
    let toml_value = toml_value.filter(|v| is_valid_secret(v));

    match (env_value, toml_value) {
        (Some(env), Some(_)) => {
            warn!(
                "{} set in both environment and TOML config. Using environment (highest priority).",
                env_name
            );
            Some(env)
        }
        (Some(env), None) => {
            info!("{} loaded from environment variable", env_name);
            Some(env)
        }
        (None, Some(toml)) => {
            info!("{} loaded from TOML config", env_name);
            Some(toml.to_string())
        }
        (None, None) => None,
    }
}

/// Non-empty, non-whitespace
pub fn is_valid_secret(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Missing credential error naming both places it can be set
pub fn missing_secret(env_name: &str, toml_key: &str) -> Error {
    Error::Config(format!(
        "{} not configured. Set the {} environment variable or `{}` in the [storage] section of the config file",
        toml_key, env_name, toml_key
    ))
}

/// Runtime settings of one engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub root_folder: PathBuf,
    /// Maximum remote storage per show, in bytes
    pub quota_bytes: u64,
    /// Deadline for one whole show operation
    pub operation_timeout: Duration,
    /// Recent items inspected per subscribed channel on sync
    pub recent_limit: usize,
    pub owner: OwnerConfig,
}

impl EngineConfig {
    pub fn from_toml(root_folder: PathBuf, config: &TomlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            root_folder,
            quota_bytes: config.quota.max_storage_bytes(),
            operation_timeout: config.sync.operation_timeout(),
            recent_limit: config.sync.recent_limit,
            owner: config.owner.clone(),
        })
    }

    /// Defaults for everything but the root folder
    pub fn with_root(root_folder: impl Into<PathBuf>) -> Self {
        let defaults = TomlConfig::default();
        Self {
            root_folder: root_folder.into(),
            quota_bytes: defaults.quota.max_storage_bytes(),
            operation_timeout: defaults.sync.operation_timeout(),
            recent_limit: defaults.sync.recent_limit,
            owner: defaults.owner,
        }
    }

    pub fn quota_bytes(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }
}
