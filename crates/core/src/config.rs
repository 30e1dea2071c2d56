//! Configuration management
//!
//! The configuration is a TOML file stored in `<config dir>/b2/config.toml`
//! (override the directory with `B2_CONFIG_DIR`). It is loaded once, merged
//! with command-line overrides, and passed by reference to the client.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::retry::{Backoff, NoRetry, RetryPolicy, SingleRetry};
use crate::types::Credentials;

/// Default host used for `b2_authorize_account`
pub const DEFAULT_API_HOST: &str = "https://api.backblazeb2.com";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "B2_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Which retry policy the client applies to API calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// One immediate retry after a non-fatal error
    #[default]
    Single,
    /// Fail on the first error
    None,
    /// Exponential backoff up to `max_attempts`
    Backoff,
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub policy: RetryMode,
    /// Total attempts for the backoff policy
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryMode::Single,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        }
    }
}

impl RetryConfig {
    /// Build the policy described by this configuration
    pub fn build_policy(&self) -> Arc<dyn RetryPolicy> {
        match self.policy {
            RetryMode::Single => Arc::new(SingleRetry),
            RetryMode::None => Arc::new(NoRetry),
            RetryMode::Backoff => Arc::new(Backoff {
                max_attempts: self.max_attempts.max(1),
                initial_backoff_ms: self.initial_backoff_ms,
                max_backoff_ms: self.max_backoff_ms,
            }),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account_id: Option<String>,
    pub application_key: Option<String>,
    /// Host serving `b2_authorize_account`
    pub api_host: String,
    /// Per-request timeout; transfers are unbounded when unset
    pub timeout_secs: Option<u64>,
    /// Default number of concurrent transfers
    pub threads: usize,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_id: None,
            application_key: None,
            api_host: DEFAULT_API_HOST.to_string(),
            timeout_secs: None,
            threads: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Credentials for the account, or a configuration error if incomplete
    pub fn credentials(&self) -> Result<Credentials> {
        let account_id = self
            .account_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::Config("account ID is not set (use --account or B2_ACCOUNT_ID)".into())
            })?;
        let application_key = self
            .application_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::Config("application key is not set (use --app-key or B2_APP_KEY)".into())
            })?;
        Ok(Credentials::new(account_id, application_key))
    }

    /// The parsed API host
    pub fn api_host_url(&self) -> Result<Url> {
        let url = Url::parse(&self.api_host)
            .map_err(|e| Error::Config(format!("invalid api_host '{}': {e}", self.api_host)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "api_host must be an http(s) URL: {}",
                self.api_host
            )));
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.api_host_url()?;
        if self.threads == 0 {
            return Err(Error::Config("threads must be at least 1".into()));
        }
        Ok(())
    }
}

/// Loads and saves the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Use the default location, honouring `B2_CONFIG_DIR`
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".into()))?
                .join("b2"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    /// Use an explicit file path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the configuration, falling back to defaults if the file is missing
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", self.config_path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration, creating the directory if needed
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(config).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }
}
