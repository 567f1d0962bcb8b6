//! Configuration file parser for ~/.config/feedcache/config.toml.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted but logged, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::assignment::DEFAULT_PLACEHOLDER_TITLE;
use crate::feed::{ResolverOptions, DEFAULT_MAX_FEED_SIZE, DEFAULT_USER_AGENT};
use crate::scheduler::{
    SchedulerOptions, DEFAULT_FAILURE_WARN_THRESHOLD, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_SWEEP_INTERVAL, DEFAULT_WORKERS, MAX_SWEEP_INTERVAL,
};

/// Upper bound on `resolver.timeout_secs` (1 hour).
const MAX_RESOLVER_TIMEOUT_SECS: u64 = 3600;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML with an unusable value.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. Defaults to `feedcache.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Title given to a source before its first resolution.
    pub placeholder_title: String,

    pub scheduler: SchedulerConfig,

    pub resolver: ResolverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            placeholder_title: DEFAULT_PLACEHOLDER_TITLE.to_string(),
            scheduler: SchedulerConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

/// `[scheduler]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    /// Seconds between full sweeps (orphan cleanup plus re-enqueue).
    pub sweep_interval_secs: u64,
    pub failure_warn_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL.as_secs(),
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
        }
    }
}

/// `[resolver]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Bound on one fetch+parse, in seconds.
    pub timeout_secs: u64,
    pub max_feed_bytes: usize,
    pub user_agent: String,
    pub prefer_document_title: bool,
    pub block_private_networks: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let options = ResolverOptions::default();
        Self {
            timeout_secs: options.timeout.as_secs(),
            max_feed_bytes: DEFAULT_MAX_FEED_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            prefer_document_title: options.prefer_document_title,
            block_private_networks: options.block_private_networks,
        }
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        SchedulerOptions {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            failure_warn_threshold: config.failure_warn_threshold,
        }
    }
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        ResolverOptions {
            timeout: Duration::from_secs(config.timeout_secs),
            max_feed_size: config.max_feed_bytes,
            prefer_document_title: config.prefer_document_title,
            block_private_networks: config.block_private_networks,
        }
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["database_path", "placeholder_title", "scheduler", "resolver"];
const SCHEDULER_KEYS: &[&str] = &[
    "workers",
    "queue_capacity",
    "sweep_interval_secs",
    "failure_warn_threshold",
];
const RESOLVER_KEYS: &[&str] = &[
    "timeout_secs",
    "max_feed_bytes",
    "user_agent",
    "prefer_document_title",
    "block_private_networks",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never loaded
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            workers = config.scheduler.workers,
            sweep_interval_secs = config.scheduler.sweep_interval_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
        }
        if scheduler.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.queue_capacity must be at least 1".into(),
            ));
        }
        if scheduler.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.sweep_interval_secs must be positive".into(),
            ));
        }
        if scheduler.sweep_interval_secs > MAX_SWEEP_INTERVAL.as_secs() {
            return Err(ConfigError::Invalid(format!(
                "scheduler.sweep_interval_secs must be at most {}",
                MAX_SWEEP_INTERVAL.as_secs()
            )));
        }
        if self.resolver.timeout_secs == 0 {
            return Err(ConfigError::Invalid("resolver.timeout_secs must be positive".into()));
        }
        if self.resolver.timeout_secs > MAX_RESOLVER_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "resolver.timeout_secs must be at most {MAX_RESOLVER_TIMEOUT_SECS}"
            )));
        }
        if self.resolver.max_feed_bytes == 0 {
            return Err(ConfigError::Invalid("resolver.max_feed_bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::from(&self.scheduler)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions::from(&self.resolver)
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for (key, value) in raw {
        let nested = match key.as_str() {
            "scheduler" => Some(SCHEDULER_KEYS),
            "resolver" => Some(RESOLVER_KEYS),
            k if TOP_LEVEL_KEYS.contains(&k) => None,
            _ => {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                continue;
            }
        };

        if let (Some(known), Some(table)) = (nested, value.as_table()) {
            for sub in table.keys() {
                if !known.contains(&sub.as_str()) {
                    tracing::warn!(key = %format!("{key}.{sub}"), "Unknown key in config file, ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
