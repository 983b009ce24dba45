//! Short-lived key/value storage for verification codes.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Outcome of [`CodeCache::take_if_eq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Take {
    /// No live entry under the key.
    Missing,
    /// An entry exists but holds another value. It is left in place.
    Mismatch,
    /// The entry matched and has been removed.
    Consumed,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeCache: Send + Sync {
    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Removes the entry only if it currently equals `expected`.
    ///
    /// The provided body is a plain get-then-delete and is not atomic;
    /// adapters with an atomic primitive override it.
    async fn take_if_eq(&self, key: &str, expected: &str) -> CacheResult<Take> {
        match self.get(key).await? {
            None => Ok(Take::Missing),
            Some(current) if current != expected => Ok(Take::Mismatch),
            Some(_) => {
                // the code matched; a failed delete only leaves it to expire
                if let Err(e) = self.delete(key).await {
                    warn!(key, error = %e, "failed to delete consumed entry");
                }
                Ok(Take::Consumed)
            }
        }
    }
}

lazy_static! {
    // 0 = missing, 1 = consumed, 2 = mismatch
    static ref TAKE_IF_EQ: Script = Script::new(
        r#"
        local current = redis.call('GET', KEYS[1])
        if not current then
            return 0
        end
        if current == ARGV[1] then
            redis.call('DEL', KEYS[1])
            return 1
        end
        return 2
        "#,
    );
}

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CodeCache for RedisCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> CacheResult<Take> {
        let mut conn = self.conn.clone();
        let outcome: i64 = TAKE_IF_EQ
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(match outcome {
            0 => Take::Missing,
            1 => Take::Consumed,
            _ => Take::Mismatch,
        })
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local cache for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeCache for InMemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                debug!(key, "evicting expired entry");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> CacheResult<Take> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let outcome = match entries.get(key) {
            Some(entry) if !entry.is_live(now) => Take::Missing,
            Some(entry) if entry.value == expected => Take::Consumed,
            Some(_) => return Ok(Take::Mismatch),
            None => return Ok(Take::Missing),
        };
        entries.remove(key);
        Ok(outcome)
    }
}
