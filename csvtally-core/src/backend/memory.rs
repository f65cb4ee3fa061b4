//! Process-local backend with the same atomicity and expiry semantics as
//! the Redis scripts. Used by tests and single-node deployments.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{BatchApplied, BatchDelta, ProgressBackend, RawSnapshot};
use crate::{
    error::{Result, TrackerError},
    keys::ImportKeys,
    model::fields,
};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Set(HashSet<String>),
    Str(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
}

impl Store {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|deadline| deadline <= now);
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn exists(&mut self, key: &str, now: Instant) -> bool {
        self.live(key, now).is_some()
    }

    fn deadline(&mut self, key: &str, now: Instant) -> Option<Instant> {
        self.live(key, now).and_then(|entry| entry.expires_at)
    }

    fn hash_mut(
        &mut self,
        key: &str,
        now: Instant,
    ) -> Result<&mut HashMap<String, String>> {
        if !self.exists(key, now) {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Hash(HashMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|entry| &mut entry.value) {
            Some(Value::Hash(map)) => Ok(map),
            _ => Err(wrong_type(key)),
        }
    }

    fn hash(&mut self, key: &str, now: Instant) -> Result<HashMap<String, String>> {
        match self.live(key, now).map(|entry| &entry.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(map)) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hget_u64(&mut self, key: &str, field: &str, now: Instant) -> Result<Option<u64>> {
        Ok(self
            .hash(key, now)?
            .get(field)
            .and_then(|raw| raw.parse::<u64>().ok()))
    }

    fn hincrby(
        &mut self,
        key: &str,
        field: &str,
        by: u64,
        now: Instant,
    ) -> Result<u64> {
        let map = self.hash_mut(key, now)?;
        let current = match map.get(field) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                TrackerError::InvalidInput(format!(
                    "hash value at {key}.{field} is not an integer"
                ))
            })?,
            None => 0,
        };
        let next = current.saturating_add(by);
        map.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn set_deadline(&mut self, key: &str, deadline: Option<Instant>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = deadline;
        }
    }
}

fn wrong_type(key: &str) -> TrackerError {
    TrackerError::InvalidInput(format!(
        "WRONGTYPE operation against key {key} holding the wrong kind of value"
    ))
}

/// In-memory tracking store.
///
/// A single lock serialises every operation, which makes each trait method
/// atomic in the same way a Lua script is on a Redis shard. Expiry follows
/// `tokio::time`, so paused-clock tests can step across a TTL.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    store: Mutex<Store>,
    unavailable: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the cache going away: every call fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys, for asserting that nothing leaked.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock().await;
        let keys: Vec<String> = store.entries.keys().cloned().collect();
        keys.iter().filter(|key| store.exists(key, now)).count()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.store.lock().await.exists(key, now)
    }

    /// Remaining time to live of `key`, `None` when absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.store
            .lock()
            .await
            .deadline(key, now)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TrackerError::Unavailable(
                "in-memory backend marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressBackend for InMemoryBackend {
    async fn initialize(
        &self,
        keys: &ImportKeys,
        info: &[(String, String)],
        counters: &[(String, String)],
        ttl: Duration,
    ) -> Result<()> {
        self.check_available()?;
        let now = Instant::now();
        let deadline = Some(now + ttl);
        let mut store = self.store.lock().await;

        for key in keys.all() {
            store.entries.remove(key);
        }
        store.entries.insert(
            keys.info.clone(),
            Entry {
                value: Value::Hash(info.iter().cloned().collect()),
                expires_at: deadline,
            },
        );
        store.entries.insert(
            keys.counters.clone(),
            Entry {
                value: Value::Hash(counters.iter().cloned().collect()),
                expires_at: deadline,
            },
        );
        Ok(())
    }

    async fn merge_info(
        &self,
        keys: &ImportKeys,
        fields: &[(String, String)],
    ) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut store = self.store.lock().await;
        if !store.exists(&keys.info, now) {
            return Ok(false);
        }
        let map = store.hash_mut(&keys.info, now)?;
        map.extend(fields.iter().cloned());
        Ok(true)
    }

    async fn apply_batch(
        &self,
        keys: &ImportKeys,
        delta: &BatchDelta,
    ) -> Result<BatchApplied> {
        self.check_available()?;
        let now = Instant::now();
        let mut store = self.store.lock().await;

        if !store.exists(&keys.counters, now) {
            return Ok(BatchApplied::Missing);
        }
        let deadline = store.deadline(&keys.counters, now);

        if let Some(batch_number) = delta.batch_number {
            let member = batch_number.to_string();
            if !store.exists(&keys.batches, now) {
                store.entries.insert(
                    keys.batches.clone(),
                    Entry {
                        value: Value::Set(HashSet::new()),
                        expires_at: None,
                    },
                );
            }
            let inserted = match store.live(&keys.batches, now) {
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => set.insert(member),
                _ => return Err(wrong_type(&keys.batches)),
            };
            if !inserted {
                return Ok(BatchApplied::Duplicate {
                    processed_batches: store
                        .hget_u64(&keys.counters, fields::PROCESSED_BATCHES, now)?
                        .unwrap_or(0),
                    total_batches: store.hget_u64(&keys.info, fields::TOTAL_BATCHES, now)?,
                });
            }
            store.set_deadline(&keys.batches, deadline);
        }

        let processed_batches = store.hincrby(
            &keys.counters,
            fields::PROCESSED_BATCHES,
            1,
            now,
        )?;
        store.hincrby(
            &keys.counters,
            fields::PROCESSED_ROWS,
            delta.processed_rows,
            now,
        )?;
        store.hincrby(
            &keys.counters,
            fields::FAILED_ROWS,
            delta.failed_rows,
            now,
        )?;

        if !delta.failures.is_empty() {
            if !store.exists(&keys.failures, now) {
                store.entries.insert(
                    keys.failures.clone(),
                    Entry {
                        value: Value::List(Vec::new()),
                        expires_at: None,
                    },
                );
            }
            match store.live(&keys.failures, now) {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => list.extend(delta.failures.iter().cloned()),
                _ => return Err(wrong_type(&keys.failures)),
            }
            store.set_deadline(&keys.failures, deadline);
        }

        let total_batches = store.hget_u64(&keys.info, fields::TOTAL_BATCHES, now)?;

        Ok(BatchApplied::Applied {
            processed_batches,
            total_batches,
        })
    }

    async fn claim_completion(
        &self,
        keys: &ImportKeys,
        completed_at: &str,
    ) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut store = self.store.lock().await;

        if !store.exists(&keys.info, now) || store.exists(&keys.completed, now)
        {
            return Ok(false);
        }
        let deadline = store.deadline(&keys.info, now);
        store.entries.insert(
            keys.completed.clone(),
            Entry {
                value: Value::Str(completed_at.to_string()),
                expires_at: deadline,
            },
        );
        store
            .hash_mut(&keys.info, now)?
            .insert(fields::COMPLETED_AT.to_string(), completed_at.to_string());
        Ok(true)
    }

    async fn read(&self, keys: &ImportKeys) -> Result<RawSnapshot> {
        self.check_available()?;
        let now = Instant::now();
        let mut store = self.store.lock().await;
        let info = store.hash(&keys.info, now)?;
        let counters = store.hash(&keys.counters, now)?;
        let failures = match store.live(&keys.failures, now).map(|e| &e.value) {
            None => Vec::new(),
            Some(Value::List(list)) => list.clone(),
            Some(_) => return Err(wrong_type(&keys.failures)),
        };
        Ok(RawSnapshot {
            info,
            counters,
            failures,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.store.lock().await.entries.remove(key);
        Ok(())
    }
}
