//! Composes the effective [`TrackerConfig`].
//!
//! Evaluation order:
//! 1) `.env` in the working directory, if present, is loaded into the
//!    process environment (existing variables win),
//! 2) a config file from `$CSVTALLY_CONFIG_PATH`, or else the first default
//!    candidate that exists (`csvtally.toml`, `csvtally.json`,
//!    `config/csvtally.toml`, `config/csvtally.json`),
//! 3) `REDIS_URL`, `CSVTALLY_KEY_PREFIX`, `CSVTALLY_TTL` and
//!    `CSVTALLY_COMPLETION_DELAY` override individual file values,
//! 4) built-in defaults fill whatever is still unset.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
    error::ConfigLoadError,
    models::{
        ConfigSource, RedisConfig, TrackerConfig,
        sources::{EnvConfig, FileConfig},
    },
    util::parse_duration,
};

const CANDIDATES: &[&str] = &[
    "csvtally.toml",
    "csvtally.json",
    "config/csvtally.toml",
    "config/csvtally.json",
];

/// The composed configuration together with the file it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: TrackerConfig,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    base_dir: Option<PathBuf>,
    skip_dotenv: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve default candidates and `.env` relative to `dir` instead of
    /// the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn skip_dotenv(mut self) -> Self {
        self.skip_dotenv = true;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        self.load_with_env(&self.gather_env())
    }

    /// Apply `.env` (unless skipped) and capture the environment layer, so
    /// callers can patch it before composing.
    pub fn gather_env(&self) -> EnvConfig {
        if !self.skip_dotenv {
            self.load_dotenv();
        }
        EnvConfig::gather()
    }

    /// Same as [`ConfigLoader::load`] but with an explicit environment and
    /// no `.env` handling.
    pub fn load_with_env(
        &self,
        env: &EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file, source) = if let Some(path) = env.config_path.as_ref() {
            let path = self.resolve(path);
            (Some(load_file(&path)?), ConfigSource::EnvPath(path))
        } else if let Some(path) = self.find_default_file() {
            (Some(load_file(&path)?), ConfigSource::File(path))
        } else {
            (None, ConfigSource::Default)
        };

        let config = compose(file.unwrap_or_default(), env)?;
        config.validate()?;

        info!(
            source = ?source,
            key_prefix = %config.key_prefix,
            ttl = %humantime::format_duration(config.ttl),
            completion_delay = %humantime::format_duration(config.completion_delay),
            "Tracker configuration loaded"
        );
        Ok(ConfigLoad { config, source })
    }

    fn load_dotenv(&self) {
        let result = match self.base_dir.as_ref() {
            Some(dir) => dotenvy::from_path(dir.join(".env")).map(|_| ()),
            None => dotenvy::dotenv().map(|_| ()),
        };
        if let Err(err) = result
            && !err.not_found()
        {
            debug!(error = %err, "ignoring unreadable .env file");
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.base_dir.as_ref() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        CANDIDATES
            .iter()
            .map(|candidate| self.resolve(Path::new(candidate)))
            .find(|path| path.is_file())
    }
}

/// Layer environment overrides over file values, then defaults.
pub fn compose(
    file: FileConfig,
    env: &EnvConfig,
) -> Result<TrackerConfig, ConfigLoadError> {
    let defaults = TrackerConfig::default();

    let url = env
        .redis_url
        .clone()
        .or_else(|| file.redis.map(|redis| redis.url))
        .unwrap_or(defaults.redis.url);
    let key_prefix = env
        .key_prefix
        .clone()
        .or(file.key_prefix)
        .unwrap_or(defaults.key_prefix);
    let ttl = match env.ttl.as_deref().or(file.ttl.as_deref()) {
        Some(raw) => parse_duration("ttl", raw)?,
        None => defaults.ttl,
    };
    let completion_delay =
        match env.completion_delay.as_deref().or(file.completion_delay.as_deref()) {
            Some(raw) => parse_duration("completion_delay", raw)?,
            None => defaults.completion_delay,
        };

    Ok(TrackerConfig {
        redis: RedisConfig { url },
        key_prefix,
        ttl,
        completion_delay,
    })
}

pub fn load_file(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents, &origin),
        Some("toml") | Some("tml") => toml::from_str(&contents).map_err(|err| {
            ConfigLoadError::Parse {
                origin,
                reason: err.to_string(),
            }
        }),
        _ => parse_from_str(&contents, &origin),
    }
}

/// Try TOML first, then JSON.
pub fn parse_from_str(
    contents: &str,
    origin: &str,
) -> Result<FileConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            reason: format!("toml error: {toml_err}; json error: {json_err}"),
        })
    })
}

fn parse_json(contents: &str, origin: &str) -> Result<FileConfig, ConfigLoadError> {
    serde_json::from_str(contents).map_err(|err| ConfigLoadError::Parse {
        origin: origin.to_string(),
        reason: err.to_string(),
    })
}
