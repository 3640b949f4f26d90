use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use thiserror::Error;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "retentiond.toml";

/// Prefix for environment overrides, e.g. `RETENTIOND__RETENTION__CHECK_INTERVAL=10m`.
pub const ENV_PREFIX: &str = "RETENTIOND__";

/// Retention enforcement configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfig {
    /// Enable retention enforcement.
    ///
    /// Env: RETENTIOND__RETENTION__ENABLED
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between retention sweeps.
    ///
    /// Env: RETENTIOND__RETENTION__CHECK_INTERVAL
    #[serde(with = "humantime_serde", default = "default_check_interval")]
    pub check_interval: Duration,

    /// Remove locally stored shards whose shard group is already gone from
    /// metadata, e.g. after a failed physical deletion in an earlier sweep.
    ///
    /// Env: RETENTIOND__RETENTION__RECONCILE_ORPHANS
    #[serde(default = "default_reconcile_orphans")]
    pub reconcile_orphans: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_reconcile_orphans() -> bool {
    true
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            check_interval: default_check_interval(),
            reconcile_orphans: default_reconcile_orphans(),
        }
    }
}

impl RetentionConfig {
    /// Validate the retention configuration.
    ///
    /// A disabled service never ticks, so its interval is not checked.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.check_interval.is_zero() {
            return Err(ConfigError::InvalidCheckInterval(self.check_interval));
        }
        Ok(())
    }
}

/// Local shard storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Root directory holding `<database>/<policy>/<shard_id>` shard directories.
    ///
    /// Env: RETENTIOND__STORAGE__DATA_DIR
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".data/shards"),
        }
    }
}

/// Metadata authority configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct MetaConfig {
    /// JSON snapshot of databases, retention policies and shard groups.
    /// When unset the node starts with empty metadata.
    ///
    /// Env: RETENTIOND__META__SNAPSHOT_PATH
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Write the snapshot back after every metadata mutation.
    ///
    /// Env: RETENTIOND__META__PERSIST
    #[serde(default)]
    pub persist: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Configuration {
    /// Retention enforcement settings
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Local shard storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata authority
    #[serde(default)]
    pub meta: MetaConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Configuration {
    /// Load defaults, then `retentiond.toml`, then `RETENTIOND__*` env vars.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Same as [`Configuration::load`] with an explicit configuration file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retention.validate()?;
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }
        if self.meta.persist && self.meta.snapshot_path.is_none() {
            return Err(ConfigError::PersistWithoutSnapshot);
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid retention check interval: {0:?} must be positive")]
    InvalidCheckInterval(Duration),

    #[error("Storage data directory cannot be empty")]
    EmptyDataDir,

    #[error("meta.persist requires meta.snapshot_path to be set")]
    PersistWithoutSnapshot,
}
