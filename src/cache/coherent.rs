//! Typed read-through cache over a [`CacheBackend`].
//!
//! Hits, misses and backend failures are kept distinct so callers can log
//! and meter them, but both misses and failures fall through to the source
//! of truth. Nothing here ever deletes an entry because a read failed.

use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::{CacheKey, KeyPattern, TtlClass};
use super::store::{CacheBackend, CacheError, MemoryBackend};

pub(crate) const METRIC_CACHE_HIT: &str = "agora_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "agora_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "agora_cache_error_total";

#[derive(Debug)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
    Error(CacheError),
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

#[derive(Clone)]
pub struct CoherentCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl CoherentCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Cache backed by the bundled LRU store.
    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new(config.max_entries_non_zero()));
        Self::new(backend, config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_for(&self, key: &CacheKey) -> Duration {
        match key.ttl_class() {
            TtlClass::Resource => self.config.default_ttl(),
            TtlClass::FeedPage => self.config.feed_ttl(),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(limit)),
        }
    }

    pub async fn get<T>(&self, key: &CacheKey) -> Lookup<T>
    where
        T: DeserializeOwned,
    {
        if !self.config.enabled {
            return Lookup::Miss;
        }
        let family = key.family();
        let raw = self.config.namespaced(&key.to_string());

        match self.bounded(self.backend.get(&raw)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT, "family" => family).increment(1);
                    Lookup::Hit(value)
                }
                Err(err) => {
                    debug!(
                        cache_key = %raw,
                        error = %err,
                        "undecodable cache payload treated as miss"
                    );
                    counter!(METRIC_CACHE_MISS, "family" => family).increment(1);
                    Lookup::Miss
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "family" => family).increment(1);
                Lookup::Miss
            }
            Err(err) => {
                warn!(cache_key = %raw, error = %err, "cache read failed");
                counter!(METRIC_CACHE_ERROR, "family" => family, "op" => "get").increment(1);
                Lookup::Error(err)
            }
        }
    }

    /// Writes with the TTL configured for the key's class.
    pub async fn set<T>(&self, key: &CacheKey, value: &T)
    where
        T: Serialize + ?Sized,
    {
        self.set_with_ttl(key, value, self.ttl_for(key)).await;
    }

    pub async fn set_with_ttl<T>(&self, key: &CacheKey, value: &T, ttl: Duration)
    where
        T: Serialize + ?Sized,
    {
        if !self.config.enabled {
            return;
        }
        let raw = self.config.namespaced(&key.to_string());
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                warn!(
                    cache_key = %raw,
                    error = %CacheError::codec(err),
                    "cache payload encoding failed"
                );
                counter!(METRIC_CACHE_ERROR, "family" => key.family(), "op" => "encode")
                    .increment(1);
                return;
            }
        };

        if let Err(err) = self.bounded(self.backend.set(&raw, payload, ttl)).await {
            warn!(cache_key = %raw, error = %err, "cache write failed");
            counter!(METRIC_CACHE_ERROR, "family" => key.family(), "op" => "set").increment(1);
        }
    }

    /// Removes one key; `Ok(true)` when an entry was actually dropped.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        if !self.config.enabled {
            return Ok(false);
        }
        let raw = self.config.namespaced(&key.to_string());
        self.bounded(self.backend.delete(&raw)).await
    }

    /// Removes every key in the family. Scans the backend key space.
    pub async fn delete_by_pattern(&self, pattern: &KeyPattern) -> Result<u64, CacheError> {
        if !self.config.enabled {
            return Ok(0);
        }
        let raw = self.config.namespaced(&pattern.to_string());
        self.bounded(self.backend.delete_by_pattern(&raw)).await
    }

    pub async fn close(&self) {
        if let Err(err) = self.backend.close().await {
            warn!(error = %err, "cache backend close failed");
        }
    }

    /// Returns the cached value or loads, writes back, and returns it.
    ///
    /// Loader errors propagate untouched and nothing is written.
    pub async fn read_through<T, E, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Lookup::Hit(value) = self.get::<T>(key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.set(key, &value).await;
        Ok(value)
    }
}
