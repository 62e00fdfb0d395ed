use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DELETE_IF_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Ephemeral key/value collaborator for codes, ceremony and federation state.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: &str, expiry_seconds: i64) -> Result<(), anyhow::Error>;
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
    /// Read and delete in one step. At most one caller sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    /// Delete `key` only while it still holds `expected`. Returns whether it did.
    async fn delete_if(&self, key: &str, expected: &str) -> Result<bool, anyhow::Error>;
    /// Increment a counter, creating it with the given expiry. Returns the new value.
    async fn incr(&self, key: &str, expiry_seconds: i64) -> Result<i64, anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl Cache for RedisService {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }

    async fn set(&self, key: &str, value: &str, expiry_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set {}: {}", key, e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get {}: {}", key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete {}: {}", key, e))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to take {}: {}", key, e))
    }

    async fn delete_if(&self, key: &str, expected: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let deleted: i64 = redis::Script::new(DELETE_IF_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete {}: {}", key, e))?;
        Ok(deleted == 1)
    }

    async fn incr(&self, key: &str, expiry_seconds: i64) -> Result<i64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(expiry_seconds.max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment {}: {}", key, e))?;
        Ok(count)
    }
}

/// In-memory cache for tests. Entries expire like Redis keys.
pub struct MockCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl Default for MockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))
    }

    /// Keys currently live, for assertions.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|m| {
                m.iter()
                    .filter(|(_, (_, deadline))| *deadline > now)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Cache for MockCache {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn set(&self, key: &str, value: &str, expiry_seconds: i64) -> Result<(), anyhow::Error> {
        let deadline = Instant::now() + Duration::from_secs(expiry_seconds.max(0) as u64);
        self.lock()?
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let entry = self.lock()?.remove(key);
        Ok(entry
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value))
    }

    async fn delete_if(&self, key: &str, expected: &str) -> Result<bool, anyhow::Error> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match entries.get(key) {
            Some((value, deadline)) if *deadline > now && value == expected => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr(&self, key: &str, expiry_seconds: i64) -> Result<i64, anyhow::Error> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let current = match entries.get(key) {
            Some((value, deadline)) if *deadline > now => Some((value.parse::<i64>()?, *deadline)),
            _ => None,
        };
        let (count, deadline) = match current {
            Some((count, deadline)) => (count + 1, deadline),
            None => (
                1,
                now + Duration::from_secs(expiry_seconds.max(1) as u64),
            ),
        };
        entries.insert(key.to_string(), (count.to_string(), deadline));
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_is_single_consume() {
        let cache = MockCache::new();
        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_if_only_matches_current_value() {
        let cache = MockCache::new();
        cache.set("k", "old", 60).await.unwrap();
        cache.set("k", "new", 60).await.unwrap();

        assert!(!cache.delete_if("k", "old").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
        assert!(cache.delete_if("k", "new").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_counts_from_one() {
        let cache = MockCache::new();
        assert_eq!(cache.incr("n", 60).await.unwrap(), 1);
        assert_eq!(cache.incr("n", 60).await.unwrap(), 2);
        cache.delete("n").await.unwrap();
        assert_eq!(cache.incr("n", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_entries_are_expired() {
        let cache = MockCache::new();
        cache.set("k", "v", 0).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.keys().is_empty());
    }
}
