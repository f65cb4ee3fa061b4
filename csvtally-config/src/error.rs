use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("{field} is not a valid duration ({value:?}): {source}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("invalid Redis URL {url:?}: {reason}")]
    InvalidRedisUrl { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
