//! Storage port for import tracking state.
//!
//! Every method is one atomic round trip against the cache. Implementations
//! must not split a method into separately observable writes; the tracker's
//! exactly-once completion relies on it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::{error::Result, keys::ImportKeys};

pub mod memory;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub mod redis;

pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;

/// Increments and failure entries applied by one batch report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDelta {
    pub processed_rows: u64,
    pub failed_rows: u64,
    /// JSON-encoded failure records, appended in order.
    pub failures: Vec<String>,
    pub batch_number: Option<u64>,
}

/// Result of [`ProgressBackend::apply_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchApplied {
    /// Counters absent: never initialized or already expired. Nothing was
    /// written.
    Missing,
    /// The batch number was already recorded. Nothing was written; the
    /// counts are the current ones, read inside the same atomic step.
    Duplicate {
        processed_batches: u64,
        total_batches: Option<u64>,
    },
    Applied {
        /// `processed_batches` as produced by this very increment.
        processed_batches: u64,
        /// `total_batches` read inside the same atomic step; `None` when the
        /// info record is gone.
        total_batches: Option<u64>,
    },
}

/// Raw hashes and list read in one batched round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSnapshot {
    pub info: HashMap<String, String>,
    pub counters: HashMap<String, String>,
    pub failures: Vec<String>,
}

#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Replace any previous state for the group: write `info`, zero the
    /// counters, drop failures, completion claim and batch ledger, then
    /// expire `info` and `counters` after `ttl`.
    async fn initialize(
        &self,
        keys: &ImportKeys,
        info: &[(String, String)],
        counters: &[(String, String)],
        ttl: Duration,
    ) -> Result<()>;

    /// Merge fields into the info hash. Returns `false` without writing
    /// when the info hash does not exist.
    async fn merge_info(
        &self,
        keys: &ImportKeys,
        fields: &[(String, String)],
    ) -> Result<bool>;

    /// Guard, increment, append and read back in one atomic step. Keys
    /// created here inherit the counters' remaining TTL.
    async fn apply_batch(
        &self,
        keys: &ImportKeys,
        delta: &BatchDelta,
    ) -> Result<BatchApplied>;

    /// Set-if-absent on the completion key; the winner also stamps
    /// `completed_at` on the info hash. Returns `true` only for the winner.
    async fn claim_completion(
        &self,
        keys: &ImportKeys,
        completed_at: &str,
    ) -> Result<bool>;

    async fn read(&self, keys: &ImportKeys) -> Result<RawSnapshot>;

    /// Delete a single key. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
