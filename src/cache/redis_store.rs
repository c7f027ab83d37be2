use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::CacheClient;
use crate::Result;
use crate::config::RedisOptions;

/// Redis-backed store, shared by every replica.
///
/// The connection manager reconnects on its own; each call clones the handle
/// so concurrent requests never contend on a lock.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect using `options`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upstream`] if the server is unreachable.
    pub async fn connect(options: &RedisOptions) -> Result<Self> {
        let client = redis::Client::open(options.url())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait::async_trait]
impl CacheClient for RedisCache {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl.filter(|t| !t.is_zero()) {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.del(keys).await?)
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        if keys.is_empty() {
            return Ok(true);
        }
        let mut conn = self.conn.clone();
        let found: usize = redis::cmd("EXISTS")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(found == keys.len())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        Ok(conn.expire(key, seconds).await?)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, 1_i64).await?)
    }
}
