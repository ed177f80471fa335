//! TOML Configuration File Support
//!
//! Centralized configuration loading for the assistant client, supporting a
//! TOML configuration file at `~/.config/mai/assistant.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (when applicable)
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file follows XDG Base Directory specification:
//! - `$XDG_CONFIG_HOME/mai/assistant.toml` (typically `~/.config/mai/assistant.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000/api"
//! token = "eyJhbGciOi..."
//! account_id = 1
//! user_id = 1
//! connect_timeout_ms = 10000
//! request_timeout_secs = 30
//!
//! [reveal]
//! initial_delay_ms = 400
//! step_ms = 400
//! settle_ms = 200
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reveal::RevealTiming;

/// Default API base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// API section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the finance API
    pub base_url: Option<String>,

    /// Bearer token
    pub token: Option<String>,

    /// Account used for chat and parse requests
    pub account_id: Option<i64>,

    /// User that confirmed transactions are created for
    pub user_id: Option<i64>,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,

    /// Timeout for non-streaming requests in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Reveal section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealToml {
    /// Delay before the first proposal appears
    pub initial_delay_ms: Option<u64>,

    /// Spacing between proposals
    pub step_ms: Option<u64>,

    /// Pause between the last proposal and done
    pub settle_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// API configuration section
    pub api: ApiToml,

    /// Reveal timing section
    pub reveal: RevealToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the assistant client
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct AssistantConfig {
    /// Base URL of the finance API
    pub api_base_url: String,

    /// Bearer token, if any
    pub api_token: Option<String>,

    /// Account used for chat and parse requests
    pub account_id: i64,

    /// User that confirmed transactions are created for
    pub user_id: i64,

    /// Connect timeout for every request
    pub connect_timeout: Duration,

    /// Total timeout for non-streaming requests
    pub request_timeout: Duration,

    /// Reveal cadence for parsed transactions
    pub reveal: RevealTiming,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            account_id: 1,
            user_id: 1,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            reveal: RevealTiming::default(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl AssistantConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check values that would only fail later, at request time
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api base URL must start with http:// or https://, got {:?}",
                self.api_base_url
            )));
        }
        if self.account_id <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "account_id must be positive, got {}",
                self.account_id
            )));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/mai/assistant.toml` or
/// `~/.config/mai/assistant.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("mai").join("assistant.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<AssistantConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<AssistantConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration reading environment variables through `env`
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<AssistantConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = AssistantConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: AssistantToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut AssistantConfig, toml: &AssistantToml) {
    if let Some(ref url) = toml.api.base_url {
        config.api_base_url = url.clone();
    }
    if toml.api.token.is_some() {
        config.api_token = toml.api.token.clone();
    }
    if let Some(account_id) = toml.api.account_id {
        config.account_id = account_id;
    }
    if let Some(user_id) = toml.api.user_id {
        config.user_id = user_id;
    }
    if let Some(ms) = toml.api.connect_timeout_ms {
        config.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(ms) = toml.reveal.initial_delay_ms {
        config.reveal.initial = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.reveal.step_ms {
        config.reveal.step = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.reveal.settle_ms {
        config.reveal.settle = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut AssistantConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("MAI_API_URL") {
        config.api_base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env("MAI_API_TOKEN") {
        config.api_token = Some(token);
        config.source = ConfigSource::Env;
    }

    let parsed = |key: &str| -> Option<i64> {
        let raw = env(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring non-numeric environment value");
                None
            }
        }
    };

    if let Some(account_id) = parsed("MAI_ACCOUNT_ID") {
        config.account_id = account_id;
        config.source = ConfigSource::Env;
    }
    if let Some(user_id) = parsed("MAI_USER_ID") {
        config.user_id = user_id;
        config.source = ConfigSource::Env;
    }

    let millis = |key: &str| parsed(key).and_then(|v| u64::try_from(v).ok()).map(Duration::from_millis);

    if let Some(timeout) = millis("MAI_CONNECT_TIMEOUT_MS") {
        config.connect_timeout = timeout;
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parsed("MAI_REQUEST_TIMEOUT_SECS").and_then(|v| u64::try_from(v).ok()) {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
    if let Some(initial) = millis("MAI_REVEAL_INITIAL_MS") {
        config.reveal.initial = initial;
        config.source = ConfigSource::Env;
    }
    if let Some(step) = millis("MAI_REVEAL_STEP_MS") {
        config.reveal.step = step;
        config.source = ConfigSource::Env;
    }
    if let Some(settle) = millis("MAI_REVEAL_SETTLE_MS") {
        config.reveal.settle = settle;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base URL override
    pub api_base_url: Option<String>,

    /// Token override
    pub api_token: Option<String>,

    /// Account override
    pub account_id: Option<i64>,

    /// User override
    pub user_id: Option<i64>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API base URL override
    #[must_use]
    pub fn with_api_base_url(mut self, url: String) -> Self {
        self.api_base_url = Some(url);
        self
    }

    /// Set token override
    #[must_use]
    pub fn with_api_token(mut self, token: String) -> Self {
        self.api_token = Some(token);
        self
    }

    /// Set account override
    #[must_use]
    pub fn with_account_id(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Set user override
    #[must_use]
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut AssistantConfig) {
        if self.api_base_url.is_some()
            || self.api_token.is_some()
            || self.account_id.is_some()
            || self.user_id.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref url) = self.api_base_url {
            config.api_base_url = url.clone();
        }
        if let Some(ref token) = self.api_token {
            config.api_token = Some(token.clone());
        }
        if let Some(account_id) = self.account_id {
            config.account_id = account_id;
        }
        if let Some(user_id) = self.user_id {
            config.user_id = user_id;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
