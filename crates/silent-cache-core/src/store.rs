//! The silent cache store.
//!
//! A typed, infallible facade over a [`DurableMedium`]. Values cross the
//! medium boundary as JSON text. Anything that goes wrong in between
//! (serialization, corrupt rows, quota, database errors) is logged and
//! degraded: reads become `None`, writes become no-ops.

use crate::medium::{CacheStats, DurableMedium};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A cached value together with the time it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
}

/// Process-wide handle to the cache store.
///
/// Cloning is cheap and every clone sees the same medium.
#[derive(Clone)]
pub struct SilentCache {
    medium: Arc<dyn DurableMedium>,
}

impl SilentCache {
    pub fn new(medium: impl DurableMedium + 'static) -> Self {
        Self {
            medium: Arc::new(medium),
        }
    }

    pub fn from_arc(medium: Arc<dyn DurableMedium>) -> Self {
        Self { medium }
    }

    /// Last stored value for `key`, or `None` if absent or unreadable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Like [`get`](Self::get), with the write timestamp.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CachedValue<T>> {
        let record = match self.medium.read(key) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Cache miss for '{}'", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&record.value) {
            Ok(value) => {
                debug!("Cache hit for '{}'", key);
                Some(CachedValue {
                    value,
                    cached_at: record.cached_at,
                })
            }
            Err(e) => {
                warn!("Ignoring unreadable cache entry '{}': {}", key, e);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    ///
    /// Never fails. If `value` cannot be serialized or the medium rejects the
    /// write, the previous entry is left untouched.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("Not caching '{}': value is not serializable: {}", key, e);
                return;
            }
        };

        match self.medium.write(key, &serialized) {
            Ok(()) => debug!("Cached '{}' ({} bytes)", key, serialized.len()),
            Err(e) => warn!("Cache write failed for '{}': {}", key, e),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.medium.read(key), Ok(Some(_)))
    }

    /// Delete `key`. Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.medium.remove(key).unwrap_or_else(|e| {
            warn!("Cache remove failed for '{}': {}", key, e);
            false
        })
    }

    /// Delete every key starting with `prefix`.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        self.medium.remove_prefix(prefix).unwrap_or_else(|e| {
            warn!("Cache prefix removal failed for '{}': {}", prefix, e);
            0
        })
    }

    pub fn keys(&self) -> Vec<String> {
        self.medium.keys().unwrap_or_else(|e| {
            warn!("Cache key listing failed: {}", e);
            Vec::new()
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.medium.stats().unwrap_or_else(|e| {
            warn!("Cache stats unavailable: {}", e);
            CacheStats::default()
        })
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.medium.clear().unwrap_or_else(|e| {
            warn!("Cache clear failed: {}", e);
            0
        })
    }
}

impl fmt::Debug for SilentCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SilentCache")
            .field("medium", &self.medium.name())
            .finish()
    }
}
