/// Configuration system for context-sync
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
///
/// Every option is hot-swappable: hand a new [`Config`] to
/// [`crate::engine::ContextEngine::apply_config`] and the engine replaces its
/// analytics client and timers without a restart.
use crate::error::{ConfigError, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote analytics API configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Caret context tracking configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Connection monitoring configuration
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Remote analytics API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Base URL of the analytics API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Timeout in seconds for a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Total attempts for a call failing with a network error
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

/// Caret context tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Quiet period for caret and document events in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Interval between summary refreshes in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

/// Connection monitoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Consecutive network errors before the connection is considered lost
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Window in seconds within which the consecutive failures must occur
    #[serde(default = "default_failure_window")]
    pub failure_window_secs: u64,
}

// Default value functions
fn default_base_url() -> String {
    "https://localhost:5051".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_failure_window() -> u64 {
    60
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window(),
        }
    }
}

impl AnalyticsConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ContextConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl ConnectionConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, SyncError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SyncError> {
        let base_url = self.analytics.base_url.trim();
        if base_url.is_empty() {
            return Err(invalid("analytics.base_url", "must not be empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(invalid(
                "analytics.base_url",
                format!("must start with http:// or https://, got '{}'", base_url),
            ));
        }

        if self.analytics.request_timeout_secs == 0 {
            return Err(invalid(
                "analytics.request_timeout_secs",
                "must be greater than 0".to_string(),
            ));
        }

        if self.analytics.max_attempts == 0 {
            return Err(invalid(
                "analytics.max_attempts",
                "must be greater than 0".to_string(),
            ));
        }

        if self.context.debounce_ms == 0 {
            return Err(invalid(
                "context.debounce_ms",
                "must be greater than 0".to_string(),
            ));
        }

        if self.context.refresh_interval_secs == 0 {
            return Err(invalid(
                "context.refresh_interval_secs",
                "must be greater than 0".to_string(),
            ));
        }

        if self.connection.failure_threshold == 0 {
            return Err(invalid(
                "connection.failure_threshold",
                "must be greater than 0".to_string(),
            ));
        }

        if self.connection.failure_window_secs == 0 {
            return Err(invalid(
                "connection.failure_window_secs",
                "must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CONTEXT_SYNC_API_URL") {
            self.analytics.base_url = url;
        }

        if let Ok(token) = std::env::var("CONTEXT_SYNC_API_TOKEN") {
            self.analytics.api_token = if token.is_empty() { None } else { Some(token) };
        }

        if let Ok(debounce) = std::env::var("CONTEXT_SYNC_DEBOUNCE_MS")
            && let Ok(ms) = debounce.parse()
        {
            self.context.debounce_ms = ms;
        }

        if let Ok(refresh) = std::env::var("CONTEXT_SYNC_REFRESH_SECS")
            && let Ok(secs) = refresh.parse()
        {
            self.context.refresh_interval_secs = secs;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, SyncError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: String) -> SyncError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    }
    .into()
}
