use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::utils::error::AppError;

/// Key/value cache with per-key TTL.
///
/// Backs the token blacklist, pending registrations and the page cache.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
    /// Deletes every key matching a glob with a trailing `*`. Returns the count.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError>;
    async fn exists(&self, key: &str) -> Result<bool, AppError>;
    /// Atomic get-and-delete.
    async fn take(&self, key: &str) -> Result<Option<String>, AppError>;
}

// ==================== REDIS ====================

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        log::info!("✅ Redis connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let n: i64 = conn.del(&keys).await?;
                removed += n.max(0) as u64;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        log::debug!("🧹 Invalidated {} cache keys matching {}", removed, pattern);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }
}

// ==================== IN-PROCESS ====================

/// Process-local cache used when `REDIS_URL` is not configured.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("memory cache lock poisoned".to_string()))
    }
}

/// Matches a glob where `*` is only honoured as the final character.
fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let expires = Instant::now() + Duration::from_secs(ttl_secs.max(1));
        self.lock()?.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|key, _| !matches_pattern(key, pattern));
        Ok((before - entries.len()) as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut entries = self.lock()?;
        match entries.remove(key) {
            Some((value, expires)) if expires > Instant::now() => Ok(Some(value)),
            _ => Ok(None),
        }
    }
}
