//! Client configuration.
//!
//! # Design
//! `ClientConfig` is plain serde data so it can live in a TOML file next to
//! the rest of an application's settings. Every field has a default, so an
//! empty file (or `ClientConfig::default()`) gives a 15 second timeout, three
//! retries and exponential backoff from 100ms.
//!
//! Environment overrides are applied through a lookup function rather than
//! by reading the process environment directly, so tests can supply values
//! without mutating global state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{Backoff, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Environment variable names read by [`ClientConfig::with_env_overrides`].
pub mod vars {
    pub const TIMEOUT_MS: &str = "SHAPED_HTTP_TIMEOUT_MS";
    pub const MAX_RETRIES: &str = "SHAPED_HTTP_MAX_RETRIES";
    pub const BACKOFF_BASE_MS: &str = "SHAPED_HTTP_BACKOFF_BASE_MS";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Constant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
    pub base_delay_ms: u64,
    pub jitter: bool,
    pub respect_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: BackoffStrategy::Exponential,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            jitter: false,
            respect_retry_after: true,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        let backoff = match self.backoff {
            BackoffStrategy::Exponential => Backoff::Exponential { base },
            BackoffStrategy::Constant => Backoff::Constant(base),
        };
        RetryPolicy::new(self.max_retries, backoff)
            .with_jitter(self.jitter)
            .with_retry_after(self.respect_retry_after)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-attempt timeout applied when a request does not set its own.
    pub timeout_ms: u64,
    pub connect_timeout_ms: Option<u64>,
    pub user_agent: String,
    /// Sent with every request unless the request sets the same header.
    pub default_headers: BTreeMap<String, String>,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: None,
            user_agent: format!("shaped-http/{}", env!("CARGO_PKG_VERSION")),
            default_headers: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Applies overrides from the process environment. See [`vars`].
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout_ms) = parse_var(&lookup, vars::TIMEOUT_MS)? {
            self.timeout_ms = timeout_ms;
        }
        if let Some(max_retries) = parse_var(&lookup, vars::MAX_RETRIES)? {
            self.retry.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = parse_var(&lookup, vars::BACKOFF_BASE_MS)? {
            self.retry.base_delay_ms = base_delay_ms;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "connect_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn default_headers(&self) -> Vec<(String, String)> {
        self.default_headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
