//! # Allocator Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ORNUM_DATABASE_PATH=/var/lib/ornum/ornum.db                        │
//! │     ORNUM_DEFAULT_BAND_SIZE=50000                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ornum.toml                                                         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "ornum.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [allocator]
//! default_band_size = 100000
//! max_retries = 3
//! initial_backoff_ms = 25
//! max_backoff_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use ornum_core::DEFAULT_BAND_SIZE;

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a connection waits for the SQLite write lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("ornum.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            run_migrations: default_true(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .run_migrations(self.run_migrations)
    }
}

// =============================================================================
// Allocator Settings
// =============================================================================

/// `[allocator]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Band width given to series opened with this configuration. A
    /// series keeps the width it was opened with.
    #[serde(default = "default_band_size")]
    pub default_band_size: i64,

    /// Retries after the first attempt when an allocation hits lock
    /// contention. 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_band_size() -> i64 {
    DEFAULT_BAND_SIZE
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    25
}
fn default_max_backoff() -> u64 {
    1_000
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            default_band_size: default_band_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl AllocatorConfig {
    pub fn default_band_size(mut self, band_size: i64) -> Self {
        self.default_band_size = band_size;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_band_size <= 0 {
            return Err(ConfigError::Invalid(
                "allocator.default_band_size must be greater than 0".into(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "allocator.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration of an allocator deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrnumConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub allocator: AllocatorConfig,
}

impl OrnumConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file, if given and present
    /// 3. `ORNUM_*` environment variables
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if path.exists() {
                info!(?path, "Loading ornum config from file");
                let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document. Missing sections and keys take defaults.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        self.allocator.validate()
    }

    /// Applies `ORNUM_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ORNUM_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        override_parsed(&lookup, "ORNUM_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_parsed(&lookup, "ORNUM_BUSY_TIMEOUT_MS", &mut self.database.busy_timeout_ms);
        override_parsed(
            &lookup,
            "ORNUM_DEFAULT_BAND_SIZE",
            &mut self.allocator.default_band_size,
        );
        override_parsed(&lookup, "ORNUM_MAX_RETRIES", &mut self.allocator.max_retries);
        override_parsed(
            &lookup,
            "ORNUM_INITIAL_BACKOFF_MS",
            &mut self.allocator.initial_backoff_ms,
        );
        override_parsed(&lookup, "ORNUM_MAX_BACKOFF_MS", &mut self.allocator.max_backoff_ms);
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding config from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparsable environment override"),
        }
    }
}
