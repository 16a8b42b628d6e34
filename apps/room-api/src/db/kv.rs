use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::ApiError;

/// Abstraction over the shared key-value store that holds presence state.
///
/// Backed by Redis when several instances run together and an in-memory map
/// for a single process and tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;

    /// Add `member` to the set at `key` and refresh its TTL. Returns the set size.
    async fn sadd(&self, key: &str, member: &str, ttl_secs: u64) -> Result<u64, ApiError>;

    /// Remove `member` from the set at `key` and, if that empties the set,
    /// delete `clear_key` in the same atomic step. Returns how many members
    /// remain.
    async fn srem_clearing(&self, key: &str, member: &str, clear_key: &str) -> Result<u64, ApiError>;

    /// `set_ex`, but only while the set at `guard_key` has members. Atomic
    /// with respect to `srem_clearing`. Returns whether the value was written.
    async fn set_ex_if_members(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
        guard_key: &str,
    ) -> Result<bool, ApiError>;

    async fn scard(&self, key: &str) -> Result<u64, ApiError>;
}

const SREM_CLEARING: &str = r"
redis.call('SREM', KEYS[1], ARGV[1])
local remaining = redis.call('SCARD', KEYS[1])
if remaining == 0 then
  redis.call('DEL', KEYS[2])
end
return remaining
";

const SET_EX_IF_MEMBERS: &str = r"
if redis.call('SCARD', KEYS[2]) == 0 then
  return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
return 1
";

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

enum Value {
    Str(String),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn purge_expired(data: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if data.get(key).is_some_and(|e| !e.is_live(now)) {
        data.remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let now = Instant::now();
        self.data.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        purge_expired(&mut data, key, now);
        Ok(match data.get(key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Some(s.clone()),
            _ => None,
        })
    }

    async fn sadd(&self, key: &str, member: &str, ttl_secs: u64) -> Result<u64, ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        purge_expired(&mut data, key, now);

        let entry = data.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: now,
        });
        if !matches!(entry.value, Value::Set(_)) {
            return Err(ApiError::internal("Key holds a non-set value"));
        }
        entry.expires_at = now + Duration::from_secs(ttl_secs);
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(members.len() as u64)
            }
            Value::Str(_) => Ok(0),
        }
    }

    async fn srem_clearing(&self, key: &str, member: &str, clear_key: &str) -> Result<u64, ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        purge_expired(&mut data, key, now);

        let remaining = match data.get_mut(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.remove(member);
                members.len() as u64
            }
            Some(_) => return Err(ApiError::internal("Key holds a non-set value")),
            None => 0,
        };
        if remaining == 0 {
            data.remove(key);
            data.remove(clear_key);
        }
        Ok(remaining)
    }

    async fn set_ex_if_members(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
        guard_key: &str,
    ) -> Result<bool, ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        purge_expired(&mut data, guard_key, now);

        let has_members = matches!(
            data.get(guard_key),
            Some(Entry { value: Value::Set(members), .. }) if !members.is_empty()
        );
        if !has_members {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn scard(&self, key: &str) -> Result<u64, ApiError> {
        let now = Instant::now();
        let mut data = self.data.lock();
        purge_expired(&mut data, key, now);
        Ok(match data.get(key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => members.len() as u64,
            _ => 0,
        })
    }
}

// ---------------------------------------------------------------------------
// Redis implementation
// ---------------------------------------------------------------------------

/// Redis-backed store. `ConnectionManager` reconnects on its own and is cheap
/// to clone, so each call works on a clone.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("redis key-value store connected");
        Ok(Self { conn })
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await.map_err(|e| {
            tracing::error!(?e, key, "redis set failed");
            ApiError::from(e)
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| {
            tracing::error!(?e, key, "redis get failed");
            ApiError::from(e)
        })
    }

    async fn sadd(&self, key: &str, member: &str, ttl_secs: u64) -> Result<u64, ApiError> {
        let mut conn = self.conn.clone();
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let (_, _, size): (u64, bool, u64) = redis::pipe()
            .atomic()
            .sadd(key, member)
            .expire(key, ttl)
            .scard(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(?e, key, "redis sadd failed");
                ApiError::from(e)
            })?;
        Ok(size)
    }

    async fn srem_clearing(&self, key: &str, member: &str, clear_key: &str) -> Result<u64, ApiError> {
        let mut conn = self.conn.clone();
        let remaining: u64 = redis::Script::new(SREM_CLEARING)
            .key(key)
            .key(clear_key)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(?e, key, "redis srem failed");
                ApiError::from(e)
            })?;
        Ok(remaining)
    }

    async fn set_ex_if_members(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
        guard_key: &str,
    ) -> Result<bool, ApiError> {
        let mut conn = self.conn.clone();
        let written: i64 = redis::Script::new(SET_EX_IF_MEMBERS)
            .key(key)
            .key(guard_key)
            .arg(value)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(?e, key, "redis guarded set failed");
                ApiError::from(e)
            })?;
        Ok(written == 1)
    }

    async fn scard(&self, key: &str) -> Result<u64, ApiError> {
        let mut conn = self.conn.clone();
        conn.scard(key).await.map_err(|e| {
            tracing::error!(?e, key, "redis scard failed");
            ApiError::from(e)
        })
    }
}
