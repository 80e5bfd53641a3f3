//! Configuration management for rosterguard.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rosterguard_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("rosterguard.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use rosterguard_domain::{AuthConfig, PermissionCacheConfig, ResolverConfig};
use rosterguard_storage::TabStorageConfig;

const ENV_PREFIX: &str = "ROSTERGUARD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Permission resolution settings
    #[serde(default)]
    pub auth: AuthSettings,

    /// Tab storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Permission resolution settings.
///
/// Overridable with `ROSTERGUARD_AUTH__<FIELD>`, e.g.
/// `ROSTERGUARD_AUTH__LOOKUP_TIMEOUT_MS=2000`.
///
/// ```yaml
/// auth:
///   cache_ttl_secs: 300
///   lookup_timeout_ms: 5000
///   loading_deadline_ms: 3000
///   cache_key_prefix: "rosterguard.permissions."
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AuthSettings {
    /// How long a cached record is served without revalidation.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Deadline for each directory lookup.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,

    /// Overall deadline for the externally visible loading flag.
    #[serde(default = "default_loading_deadline")]
    pub loading_deadline_ms: u64,

    /// Prefix of permission cache keys in tab storage.
    #[serde(default = "default_cache_key_prefix")]
    pub cache_key_prefix: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            lookup_timeout_ms: default_lookup_timeout(),
            loading_deadline_ms: default_loading_deadline(),
            cache_key_prefix: default_cache_key_prefix(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_lookup_timeout() -> u64 {
    5_000
}

fn default_loading_deadline() -> u64 {
    3_000
}

fn default_cache_key_prefix() -> String {
    PermissionCacheConfig::default().key_prefix
}

/// Tab storage settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Maximum number of keys held in tab storage.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Keys idle for this long are dropped. 0 disables idling.
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            session_idle_secs: default_session_idle(),
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_session_idle() -> u64 {
    1_800
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `ROSTERGUARD_` and use `__`
    /// as separator, e.g. `ROSTERGUARD_AUTH__CACHE_TTL_SECS=60` overrides
    /// `auth.cache_ttl_secs`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let durations = [
            ("auth.cache_ttl_secs", self.auth.cache_ttl_secs),
            ("auth.lookup_timeout_ms", self.auth.lookup_timeout_ms),
            ("auth.loading_deadline_ms", self.auth.loading_deadline_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{name} must be greater than 0"),
                });
            }
        }

        if self.auth.cache_key_prefix.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "auth.cache_key_prefix must not be empty".to_string(),
            });
        }

        if self.storage.max_entries == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "storage.max_entries must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Domain configuration derived from the `auth` section.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::default()
            .with_cache(
                PermissionCacheConfig::default()
                    .with_ttl(Duration::from_secs(self.auth.cache_ttl_secs))
                    .with_key_prefix(self.auth.cache_key_prefix.clone()),
            )
            .with_resolver(
                ResolverConfig::default()
                    .with_lookup_timeout(Duration::from_millis(self.auth.lookup_timeout_ms)),
            )
            .with_loading_deadline(Duration::from_millis(self.auth.loading_deadline_ms))
    }

    /// Tab storage configuration derived from the `storage` section.
    pub fn tab_storage_config(&self) -> TabStorageConfig {
        let idle = (self.storage.session_idle_secs > 0)
            .then(|| Duration::from_secs(self.storage.session_idle_secs));
        TabStorageConfig::default()
            .with_max_entries(self.storage.max_entries)
            .with_idle_timeout(idle)
    }
}

// ROSTERGUARD_AUTH__LOOKUP_TIMEOUT_MS -> auth.lookup_timeout_ms
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
