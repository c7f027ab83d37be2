use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::CacheClient;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|t| !t.is_zero()).map(|t| Instant::now() + t)
}

/// In-process store backed by a `DashMap`.
///
/// Expired entries are evicted lazily on access and periodically by
/// [`super::spawn_reaper`]. State is not shared between replicas.
#[derive(Debug, Default)]
pub struct SimpleCache {
    entries: DashMap<String, Entry>,
}

impl SimpleCache {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn live(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            drop(entry);
            // Lazy eviction: remove on access
            self.entries
                .remove_if(key, |_, e| e.is_expired(Instant::now()));
            return None;
        }
        Some(entry.value.clone())
    }
}

#[async_trait::async_trait]
impl CacheClient for SimpleCache {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::Internal(format!("invalid key pattern '{pattern}': {e}")))?;
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && pattern.matches(e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize> {
        let now = Instant::now();
        Ok(keys
            .iter()
            .filter_map(|k| self.entries.remove(k))
            .filter(|(_, e)| !e.is_expired(now))
            .count())
    }

    async fn exists(&self, keys: &[String]) -> Result<bool> {
        Ok(keys.iter().all(|k| self.live(k).is_some()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reap_expired(&self) -> usize {
        self.evict_expired()
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| Error::Internal(format!("value at '{key}' is not an integer")))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }
}
