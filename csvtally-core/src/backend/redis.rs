use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, FromRedisValue, Script, aio::ConnectionManager};
use tracing::{debug, info};

use super::{BatchApplied, BatchDelta, ProgressBackend, RawSnapshot};
use crate::{error::Result, keys::ImportKeys};

/// Lua scripts for the steps that need a guard and a write to be atomic.
///
/// The KEYS/ARGV layout each script reads is produced by the matching
/// builder below ([`apply_batch_call`], [`claim_call`], [`merge_info_call`]).
mod scripts {
    use redis::Script;

    /// KEYS: counters, failures, info, batches
    /// ARGV: processed_rows, failed_rows, batch_number ('' when absent),
    ///       failure records...
    /// Returns {-1} when not initialized,
    /// {-2, processed_batches, total_batches or -1} for a duplicate batch,
    /// otherwise {processed_batches, total_batches or -1}.
    pub(super) const APPLY_BATCH: &str = r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return {-1}
            end
            local ttl = redis.call('PTTL', KEYS[1])
            local total = tonumber(redis.call('HGET', KEYS[3], 'total_batches')) or -1

            if ARGV[3] ~= '' then
                if redis.call('SADD', KEYS[4], ARGV[3]) == 0 then
                    local seen = tonumber(redis.call('HGET', KEYS[1], 'processed_batches')) or 0
                    return {-2, seen, total}
                end
                if ttl > 0 then
                    redis.call('PEXPIRE', KEYS[4], ttl)
                end
            end

            local batches = redis.call('HINCRBY', KEYS[1], 'processed_batches', 1)
            redis.call('HINCRBY', KEYS[1], 'processed_rows', ARGV[1])
            redis.call('HINCRBY', KEYS[1], 'failed_rows', ARGV[2])

            if #ARGV > 3 then
                for i = 4, #ARGV do
                    redis.call('RPUSH', KEYS[2], ARGV[i])
                end
                if ttl > 0 then
                    redis.call('PEXPIRE', KEYS[2], ttl)
                end
            end

            return {batches, total}
            "#;

    /// KEYS: info, completed
    /// ARGV: completed_at
    pub(super) const CLAIM_COMPLETION: &str = r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return 0
            end
            local ttl = redis.call('PTTL', KEYS[1])
            local claimed
            if ttl > 0 then
                claimed = redis.call('SET', KEYS[2], ARGV[1], 'NX', 'PX', ttl)
            else
                claimed = redis.call('SET', KEYS[2], ARGV[1], 'NX')
            end
            if not claimed then
                return 0
            end
            redis.call('HSET', KEYS[1], 'completed_at', ARGV[1])
            return 1
            "#;

    /// KEYS: info
    /// ARGV: field, value, field, value...
    pub(super) const MERGE_INFO: &str = r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return 0
            end
            if #ARGV > 0 then
                redis.call('HSET', KEYS[1], unpack(ARGV))
            end
            return 1
            "#;

    pub fn apply_batch() -> Script {
        Script::new(APPLY_BATCH)
    }

    pub fn claim_completion() -> Script {
        Script::new(CLAIM_COMPLETION)
    }

    pub fn merge_info() -> Script {
        Script::new(MERGE_INFO)
    }
}

/// Positional KEYS and ARGV for one script invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ScriptCall {
    keys: Vec<String>,
    args: Vec<String>,
}

fn apply_batch_call(keys: &ImportKeys, delta: &BatchDelta) -> ScriptCall {
    let mut args = vec![
        delta.processed_rows.to_string(),
        delta.failed_rows.to_string(),
        delta
            .batch_number
            .map(|n| n.to_string())
            .unwrap_or_default(),
    ];
    args.extend(delta.failures.iter().cloned());
    ScriptCall {
        keys: vec![
            keys.counters.clone(),
            keys.failures.clone(),
            keys.info.clone(),
            keys.batches.clone(),
        ],
        args,
    }
}

fn claim_call(keys: &ImportKeys, completed_at: &str) -> ScriptCall {
    ScriptCall {
        keys: vec![keys.info.clone(), keys.completed.clone()],
        args: vec![completed_at.to_string()],
    }
}

fn merge_info_call(keys: &ImportKeys, fields: &[(String, String)]) -> ScriptCall {
    ScriptCall {
        keys: vec![keys.info.clone()],
        args: fields
            .iter()
            .flat_map(|(name, value)| [name.clone(), value.clone()])
            .collect(),
    }
}

/// Redis (or Redis Cluster proxy) backed tracking store.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("Successfully connected to Redis");

        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn invoke<T: FromRedisValue>(
        &self,
        script: &Script,
        call: &ScriptCall,
    ) -> Result<T> {
        let mut conn = self.conn.clone();
        let mut invocation = script.prepare_invoke();
        for key in &call.keys {
            invocation.key(key);
        }
        for arg in &call.args {
            invocation.arg(arg);
        }
        Ok(invocation.invoke_async(&mut conn).await?)
    }
}

#[async_trait]
impl ProgressBackend for RedisBackend {
    async fn initialize(
        &self,
        keys: &ImportKeys,
        info: &[(String, String)],
        counters: &[(String, String)],
        ttl: Duration,
    ) -> Result<()> {
        let ttl_ms = ttl.as_millis() as i64;
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .del(keys.all().as_slice())
            .ignore()
            .hset_multiple(&keys.info, info)
            .ignore()
            .hset_multiple(&keys.counters, counters)
            .ignore()
            .pexpire(&keys.info, ttl_ms)
            .ignore()
            .pexpire(&keys.counters, ttl_ms)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(group = %keys, ttl_ms, "tracking keys written");
        Ok(())
    }

    async fn merge_info(
        &self,
        keys: &ImportKeys,
        fields: &[(String, String)],
    ) -> Result<bool> {
        let merged: i64 = self
            .invoke(&scripts::merge_info(), &merge_info_call(keys, fields))
            .await?;
        Ok(merged == 1)
    }

    async fn apply_batch(
        &self,
        keys: &ImportKeys,
        delta: &BatchDelta,
    ) -> Result<BatchApplied> {
        let reply: Vec<i64> = self
            .invoke(&scripts::apply_batch(), &apply_batch_call(keys, delta))
            .await?;
        Ok(decode_apply_reply(&reply))
    }

    async fn claim_completion(
        &self,
        keys: &ImportKeys,
        completed_at: &str,
    ) -> Result<bool> {
        let claimed: i64 = self
            .invoke(&scripts::claim_completion(), &claim_call(keys, completed_at))
            .await?;
        Ok(claimed == 1)
    }

    async fn read(&self, keys: &ImportKeys) -> Result<RawSnapshot> {
        let mut conn = self.conn.clone();
        let (info, counters, failures): (
            HashMap<String, String>,
            HashMap<String, String>,
            Vec<String>,
        ) = redis::pipe()
            .atomic()
            .hgetall(&keys.info)
            .hgetall(&keys.counters)
            .lrange(&keys.failures, 0, -1)
            .query_async(&mut conn)
            .await?;
        Ok(RawSnapshot {
            info,
            counters,
            failures,
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

fn decode_apply_reply(reply: &[i64]) -> BatchApplied {
    match reply {
        [-2, seen, total, ..] => BatchApplied::Duplicate {
            processed_batches: (*seen).max(0) as u64,
            total_batches: (*total >= 0).then_some(*total as u64),
        },
        [-2] => BatchApplied::Duplicate {
            processed_batches: 0,
            total_batches: None,
        },
        [batches, total, ..] if *batches >= 0 => BatchApplied::Applied {
            processed_batches: *batches as u64,
            total_batches: (*total >= 0).then_some(*total as u64),
        },
        _ => BatchApplied::Missing,
    }
}
