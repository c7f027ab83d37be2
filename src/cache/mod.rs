//! Credential store
//!
//! Key/value storage with expiry for issued token records and login failure
//! counters. [`SimpleCache`] keeps everything in process; [`RedisCache`]
//! shares state between replicas.

mod redis_store;
mod simple;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

pub use redis_store::RedisCache;
pub use simple::SimpleCache;
use crate::config::RedisOptions;
use crate::{Error, Result};

/// Host value that selects the in-process store in debug mode.
pub const FAKE_HOST: &str = "FAKE";

/// Key/value store with optional per-key expiry.
#[async_trait::async_trait]
pub trait CacheClient: Send + Sync + 'static {
    /// Keys matching a glob-style `pattern`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Value of `key`, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`. `None` or a zero `ttl` never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove `keys`, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize>;

    /// Whether every one of `keys` exists.
    async fn exists(&self, keys: &[String]) -> Result<bool>;

    /// Set the expiry of an existing key. Returns `false` if it is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically increment the integer at `key`, starting from zero.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Drop expired entries. Backends that expire keys themselves do nothing.
    async fn reap_expired(&self) -> usize {
        0
    }
}

/// Select the store backend from configuration.
///
/// No `redis` section or an empty host falls back to the in-process store;
/// so does host [`FAKE_HOST`] when `debug` is set.
///
/// # Errors
///
/// Returns [`Error::Upstream`] if the Redis connection cannot be established.
pub async fn new_cache_client(
    options: Option<&RedisOptions>,
    debug: bool,
) -> Result<Arc<dyn CacheClient>> {
    match options {
        Some(opts) if opts.host == FAKE_HOST && debug => {
            info!("Using in-process credential store (debug mode)");
            Ok(Arc::new(SimpleCache::new()))
        }
        Some(opts) if !opts.host.is_empty() => {
            let cache = RedisCache::connect(opts).await?;
            info!(host = %opts.host, port = opts.port, "Connected to Redis credential store");
            Ok(Arc::new(cache))
        }
        _ => {
            warn!(
                "No Redis host configured, using in-process credential store; \
                 tokens will not be shared between replicas"
            );
            Ok(Arc::new(SimpleCache::new()))
        }
    }
}

/// Spawn a background task that reaps expired entries every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    cache: Arc<dyn CacheClient>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = cache.reap_expired().await;
                    if reaped > 0 {
                        debug!(count = reaped, "Reaped expired credential store entries");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Credential store reaper shutting down");
                    break;
                }
            }
        }
    });
}

/// Run a store call, failing with [`Error::Upstream`] once `timeout` elapses.
///
/// # Errors
///
/// Returns the call's own error, or [`Error::Upstream`] on timeout.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| Error::Upstream(format!("credential store timed out after {timeout:?}")))?
}
