pub mod sources;

use std::{path::PathBuf, time::Duration};

use csvtally_core::{
    TrackerSettings,
    keys::DEFAULT_KEY_PREFIX,
    tracker::{DEFAULT_COMPLETION_DELAY, DEFAULT_TTL},
};
use url::Url;

use crate::error::ConfigLoadError;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Where the file layer of the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// No file; environment variables and defaults only.
    #[default]
    Default,
    /// `CSVTALLY_CONFIG_PATH` pointed at this file.
    EnvPath(PathBuf),
    /// Found at one of the default candidate locations.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

/// Effective tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub redis: RedisConfig,
    pub key_prefix: String,
    /// Lifetime of every key of a session, counted from initialization.
    pub ttl: Duration,
    pub completion_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl: DEFAULT_TTL,
            completion_delay: DEFAULT_COMPLETION_DELAY,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.ttl.is_zero() {
            return Err(ConfigLoadError::Invalid(
                "ttl must be greater than zero".to_string(),
            ));
        }

        let prefix = self.key_prefix.trim();
        if prefix.is_empty() {
            return Err(ConfigLoadError::Invalid(
                "key_prefix must not be empty".to_string(),
            ));
        }
        if prefix.contains(['{', '}']) {
            return Err(ConfigLoadError::Invalid(format!(
                "key_prefix {prefix:?} must not contain hash tag braces"
            )));
        }

        let parsed = Url::parse(&self.redis.url).map_err(|err| {
            ConfigLoadError::InvalidRedisUrl {
                url: self.redis.url.clone(),
                reason: err.to_string(),
            }
        })?;
        match parsed.scheme() {
            "redis" | "rediss" | "unix" | "redis+unix" => Ok(()),
            other => Err(ConfigLoadError::InvalidRedisUrl {
                url: self.redis.url.clone(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            key_prefix: self.key_prefix.trim().to_string(),
            ttl: self.ttl,
            completion_delay: self.completion_delay,
        }
    }
}
