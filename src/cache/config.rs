//! Cache configuration.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_NAMESPACE: &str = "agora";
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_FEED_TTL_SECS: u64 = 60;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 250;

/// Longest TTL any entry may carry: 30 days.
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup is a miss and every write a no-op.
    pub enabled: bool,
    /// Prefix joined to every key with `:`. Empty disables prefixing.
    pub namespace: String,
    /// Capacity of the in-process backend.
    pub max_entries: usize,
    /// TTL for single-resource views and lists.
    pub default_ttl_secs: u64,
    /// TTL for feed windows.
    pub feed_ttl_secs: u64,
    /// Upper bound on each backend call.
    pub operation_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl_secs: DEFAULT_TTL_SECS,
            feed_ttl_secs: DEFAULT_FEED_TTL_SECS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            namespace: settings.namespace.clone(),
            max_entries: settings.max_entries.get(),
            default_ttl_secs: settings.default_ttl_secs.get(),
            feed_ttl_secs: settings.feed_ttl_secs.get(),
            operation_timeout_ms: settings.operation_timeout_ms.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the backend capacity, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs.clamp(1, MAX_TTL_SECS))
    }

    pub fn feed_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_ttl_secs.clamp(1, MAX_TTL_SECS))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms.max(1))
    }

    /// Applies the namespace to a scheme-level key or pattern.
    pub fn namespaced(&self, key: &str) -> String {
        if self.namespace.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.namespace)
        }
    }
}
