//! Durable medium trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored record as read back from a medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// The serialized value.
    pub value: String,
    /// When the value was last written.
    pub cached_at: DateTime<Utc>,
    /// Size of the serialized value in bytes.
    pub size_bytes: u64,
}

/// Statistics for one medium namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Namespace the statistics were collected for.
    pub namespace: String,
    /// Number of stored entries.
    pub entry_count: usize,
    /// Total size of all stored values in bytes.
    pub total_size_bytes: u64,
    /// Maximum allowed size in bytes (0 = unlimited).
    pub max_size_bytes: u64,
    /// Most recent write, if any.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Synchronous key-value persistence underneath the silent cache.
///
/// A medium is scoped to a single namespace chosen when it is opened.
/// Implementations report every failure; callers decide whether to absorb it.
pub trait DurableMedium: Send + Sync {
    /// Short name for logs, e.g. "sqlite" or "memory".
    fn name(&self) -> &'static str;

    /// Read the record stored under `key`, or `None` if there is none.
    fn read(&self, key: &str) -> Result<Option<StoredRecord>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Returns whether an entry existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// All keys in the namespace, sorted.
    fn keys(&self) -> Result<Vec<String>>;

    /// Delete every key in the namespace. Returns how many were removed.
    fn clear(&self) -> Result<usize>;

    fn stats(&self) -> Result<CacheStats>;

    /// Delete every key starting with `prefix`.
    fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.keys()?.into_iter().filter(|k| k.starts_with(prefix)) {
            if self.remove(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
