use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::util::non_empty_var;

pub const CONFIG_PATH_VAR: &str = "CSVTALLY_CONFIG_PATH";
pub const REDIS_URL_VAR: &str = "REDIS_URL";
pub const KEY_PREFIX_VAR: &str = "CSVTALLY_KEY_PREFIX";
pub const TTL_VAR: &str = "CSVTALLY_TTL";
pub const COMPLETION_DELAY_VAR: &str = "CSVTALLY_COMPLETION_DELAY";

/// Raw configuration as written in a TOML or JSON file. Durations stay as
/// strings until composition so errors can name the field.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<FileRedisConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_delay: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileRedisConfig {
    pub url: String,
}

/// Values read from the process environment. Blank variables count as unset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub ttl: Option<String>,
    pub completion_delay: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var(CONFIG_PATH_VAR).map(PathBuf::from),
            redis_url: non_empty_var(REDIS_URL_VAR),
            key_prefix: non_empty_var(KEY_PREFIX_VAR),
            ttl: non_empty_var(TTL_VAR),
            completion_delay: non_empty_var(COMPLETION_DELAY_VAR),
        }
    }
}
