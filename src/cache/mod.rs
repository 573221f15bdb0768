//! Read-through cache and its coherence machinery.
//!
//! - `keys`: resource to key-string scheme and glob patterns
//! - `store`: byte-level backends ([`CacheBackend`], [`MemoryBackend`])
//! - `coherent`: typed Hit / Miss / Error access with TTLs
//! - `invalidation`: mutation to ordered deletions, run after each write
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! namespace = "agora"
//! default_ttl_secs = 300
//! feed_ttl_secs = 60
//! ```

mod coherent;
mod config;
mod invalidation;
mod keys;
mod lock;
mod store;

pub(crate) use lock::{rw_read, rw_write};

pub use coherent::{CoherentCache, Lookup};
pub use config::{CacheConfig, MAX_TTL_SECS};
pub use invalidation::{
    Invalidation, InvalidationPlan, InvalidationReport, InvalidationRouter, Mutation,
};
pub use keys::{CacheKey, KeyPattern, TtlClass, glob_match};
pub use store::{CacheBackend, CacheError, MemoryBackend};
