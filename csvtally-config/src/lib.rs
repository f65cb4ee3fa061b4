//! Configuration for csvtally.
//!
//! Loads [`TrackerConfig`] from a TOML/JSON file, environment variables and
//! built-in defaults, validates it, and converts it into the core crate's
//! [`TrackerSettings`](csvtally_core::TrackerSettings).

#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod models;
pub mod util;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader};
pub use models::{ConfigSource, RedisConfig, TrackerConfig};
pub use models::sources::{EnvConfig, FileConfig, FileRedisConfig};
