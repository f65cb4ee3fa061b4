//! Cache key derivation for one import's colocation group.
//!
//! Every key embeds the import id inside a `{...}` hash tag, so a Redis
//! Cluster hashes only the import id when choosing a slot and all keys of
//! one import land on the same shard. Multi-key scripts and `MULTI` blocks
//! over the group therefore never hit `CROSSSLOT`.

use std::fmt;

pub const DEFAULT_KEY_PREFIX: &str = "csv_import";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeyScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn keys(&self, import_id: &str) -> ImportKeys {
        let base = format!("{}:{{{}}}", self.prefix, import_id);
        ImportKeys {
            info: format!("{base}:info"),
            counters: format!("{base}:counters"),
            failures: format!("{base}:failures"),
            completed: format!("{base}:completed"),
            batches: format!("{base}:batches"),
        }
    }
}

/// Key names for one import. All of them share the same hash tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportKeys {
    /// Hash holding immutable session info plus merged metadata.
    pub info: String,
    /// Hash holding `processed_batches`, `processed_rows`, `failed_rows`.
    pub counters: String,
    /// List of JSON-encoded failure records, in append order.
    pub failures: String,
    /// Set-if-absent completion claim.
    pub completed: String,
    /// Set of batch numbers already applied.
    pub batches: String,
}

impl ImportKeys {
    pub fn all(&self) -> [&str; 5] {
        [
            &self.info,
            &self.counters,
            &self.failures,
            &self.completed,
            &self.batches,
        ]
    }
}

impl fmt::Display for ImportKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.info.trim_end_matches(":info"))
    }
}

/// Returns the portion of `key` Redis Cluster hashes to pick a slot.
///
/// Mirrors the cluster rule: the bytes between the first `{` and the next
/// `}` when that span is non-empty, otherwise the whole key.
pub fn hash_tag(key: &str) -> &str {
    if let Some(open) = key.find('{')
        && let Some(len) = key[open + 1..].find('}')
        && len > 0
    {
        return &key[open + 1..open + 1 + len];
    }
    key
}

/// Redis Cluster slot (CRC16/XMODEM of the hash tag, mod 16384).
pub fn cluster_slot(key: &str) -> u16 {
    crc16_xmodem(hash_tag(key).as_bytes()) % 16384
}

fn crc16_xmodem(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in bytes {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
