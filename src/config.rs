//! Configuration file parser for `config.toml`.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`, which watches the OpenAI status page. Unknown keys are
//! accepted by serde and logged as warnings, since they are usually typos.
//!
//! ```toml
//! [settings]
//! log_level = "info"
//! max_retries = 5
//! base_backoff = 2
//! show_historical = true
//! max_historical = 10
//!
//! [[providers]]
//! name = "OpenAI"
//! feed_url = "https://status.openai.com/history.atom"
//! feed_type = "atom"
//! poll_interval = 30
//! ```
use crate::feed::FeedType;
use crate::monitor::MAX_BACKOFF;
use crate::util::{validate_url, UrlValidationError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROVIDER_NAME: &str = "OpenAI";
pub const DEFAULT_FEED_URL: &str = "https://status.openai.com/history.atom";
pub const DEFAULT_POLL_INTERVAL: u64 = 30;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Provider {provider:?} has an invalid feed_url: {source}")]
    InvalidFeedUrl {
        provider: String,
        #[source]
        source: UrlValidationError,
    },

    #[error("Provider {0:?} must poll at least every second (poll_interval >= 1)")]
    InvalidPollInterval(String),

    #[error("Provider name must not be empty")]
    EmptyProviderName,

    #[error("Duplicate provider name: {0:?}")]
    DuplicateProvider(String),

    #[error("base_backoff must be between 0 and 300 seconds, got {0}")]
    InvalidBackoff(f64),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// One status page to watch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    /// Display name, also used to label incidents and log lines.
    pub name: String,
    pub feed_url: String,
    #[serde(default)]
    pub feed_type: FeedType,
    /// Seconds between successful polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

impl ProviderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROVIDER_NAME.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            feed_type: FeedType::Atom,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Global settings shared by every provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default tracing filter directive; `RUST_LOG` takes precedence.
    pub log_level: String,
    /// Caps the backoff exponent. Failed polls are retried indefinitely.
    pub max_retries: u32,
    /// Seconds to wait after the first consecutive failure.
    pub base_backoff: f64,
    /// Print the most recent incidents when a provider is first polled.
    pub show_historical: bool,
    pub max_historical: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_retries: 5,
            base_backoff: 2.0,
            show_historical: true,
            max_historical: 10,
        }
    }
}

impl Settings {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.base_backoff)
    }
}

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub providers: Vec<ProviderConfig>,
    pub settings: Settings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::default()],
            settings: Settings::default(),
        }
    }
}

const TOP_LEVEL_KEYS: &[&str] = &["providers", "settings"];
const SETTINGS_KEYS: &[&str] = &[
    "log_level",
    "max_retries",
    "base_backoff",
    "show_historical",
    "max_historical",
];
const PROVIDER_KEYS: &[&str] = &["name", "feed_url", "feed_type", "poll_interval"];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - No providers → the default OpenAI provider
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::warn!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(&raw);
        }

        let mut config: Config = toml::from_str(content)?;
        if config.providers.is_empty() {
            tracing::warn!("No providers configured, watching {}", DEFAULT_PROVIDER_NAME);
            config.providers.push(ProviderConfig::default());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the poll loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let backoff = self.settings.base_backoff;
        if !backoff.is_finite() || backoff <= 0.0 || backoff > MAX_BACKOFF.as_secs_f64() {
            return Err(ConfigError::InvalidBackoff(backoff));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            validate_url(&provider.feed_url).map_err(|source| ConfigError::InvalidFeedUrl {
                provider: provider.name.clone(),
                source,
            })?;
            if provider.poll_interval == 0 {
                return Err(ConfigError::InvalidPollInterval(provider.name.clone()));
            }
        }
        Ok(())
    }
}

fn warn_unknown_keys(raw: &toml::Table) {
    for key in raw.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            tracing::warn!(key = %key, "Unknown key in config file, ignoring");
        }
    }

    if let Some(settings) = raw.get("settings").and_then(toml::Value::as_table) {
        for key in settings.keys() {
            if !SETTINGS_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "Unknown key in [settings], ignoring");
            }
        }
    }

    if let Some(providers) = raw.get("providers").and_then(toml::Value::as_array) {
        for (index, provider) in providers.iter().enumerate() {
            let Some(table) = provider.as_table() else {
                continue;
            };
            for key in table.keys() {
                if !PROVIDER_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, index, "Unknown key in [[providers]], ignoring");
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
