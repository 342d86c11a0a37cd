//! Configuration for CAST
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Base trait for all configuration types
pub trait Configuration: Serialize + for<'de> Deserialize<'de> + Default {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Load configuration from a file
    fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    fn save_to_file(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Signature verification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Accepted distance between a signed timestamp and now
    pub timestamp_window_secs: u64,
    /// Domain tag prepended to every signed user message
    pub user_domain_tag: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            timestamp_window_secs: 60,
            user_domain_tag: "FLOW-V0.0-user".to_string(),
        }
    }
}

/// Chain snapshot client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Per-call timeout
    pub timeout_ms: u64,
    /// Maximum in-flight weight queries per tally
    pub max_concurrent_queries: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_concurrent_queries: 16,
        }
    }
}

impl ChainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Global access lists
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Addresses with admin rights in every community
    pub admin_allowlist: Vec<String>,
    /// Addresses blocked everywhere
    pub blocklist: Vec<String>,
}

/// Top-level CAST configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Application environment (development, testing, production)
    pub environment: String,
    pub log_level: String,
    /// Directory for the embedded store
    pub data_dir: PathBuf,
    /// Largest page a listing may return
    pub max_page_count: u64,
    pub identity: IdentityConfig,
    pub chain: ChainConfig,
    pub access: AccessConfig,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            data_dir: PathBuf::from("./data"),
            max_page_count: 25,
            identity: IdentityConfig::default(),
            chain: ChainConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

impl Configuration for CastConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self.environment.as_str() {
            "development" | "testing" | "production" => {}
            other => {
                return Err(ConfigError::Invalid(format!("Invalid environment: {}", other)))
            }
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::Invalid(format!("Invalid log level: {}", other))),
        }

        if self.max_page_count == 0 {
            return Err(ConfigError::Invalid("max_page_count must be positive".into()));
        }
        if self.chain.timeout_ms == 0 {
            return Err(ConfigError::Invalid("chain.timeout_ms must be positive".into()));
        }
        if self.chain.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "chain.max_concurrent_queries must be positive".into(),
            ));
        }
        if self.identity.user_domain_tag.len() > 32 {
            return Err(ConfigError::Invalid(
                "identity.user_domain_tag must be at most 32 bytes".into(),
            ));
        }

        Ok(())
    }
}

impl CastConfig {
    /// Defaults overridden by `CAST_*` environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(env) = std::env::var("CAST_ENVIRONMENT") {
            config.environment = env;
        }
        if let Ok(level) = std::env::var("CAST_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(dir) = std::env::var("CAST_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(count) = std::env::var("CAST_MAX_PAGE_COUNT") {
            config.max_page_count = parse_var("CAST_MAX_PAGE_COUNT", &count)?;
        }
        if let Ok(window) = std::env::var("CAST_TIMESTAMP_WINDOW_SECS") {
            config.identity.timestamp_window_secs =
                parse_var("CAST_TIMESTAMP_WINDOW_SECS", &window)?;
        }
        if let Ok(tag) = std::env::var("CAST_USER_DOMAIN_TAG") {
            config.identity.user_domain_tag = tag;
        }
        if let Ok(timeout) = std::env::var("CAST_CHAIN_TIMEOUT_MS") {
            config.chain.timeout_ms = parse_var("CAST_CHAIN_TIMEOUT_MS", &timeout)?;
        }
        if let Ok(admins) = std::env::var("CAST_ADMIN_ALLOWLIST") {
            config.access.admin_allowlist = split_list(&admins);
        }
        if let Ok(blocked) = std::env::var("CAST_BLOCKLIST") {
            config.access.blocklist = split_list(&blocked);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn ensure_directories(&self) -> ConfigResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid(format!("{}: {}", name, e)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
