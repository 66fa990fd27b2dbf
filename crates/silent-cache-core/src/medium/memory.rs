//! In-process medium.
//!
//! Nothing here survives the process, so it is mostly useful in tests and
//! for embedding the cache where no writable location exists. An optional
//! byte quota reproduces the "storage full" failures of browser-style stores.

use super::traits::{CacheStats, DurableMedium, StoredRecord};
use crate::error::{CacheError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct MemoryMedium {
    namespace: String,
    entries: RwLock<HashMap<String, StoredRecord>>,
    quota_bytes: Option<u64>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self {
            namespace: crate::config::CacheDefaults::NAMESPACE.to_string(),
            entries: RwLock::new(HashMap::new()),
            quota_bytes: None,
        }
    }

    /// Reject writes that would push the total stored size past `quota_bytes`.
    pub fn with_quota(mut self, quota_bytes: u64) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn poisoned<E: std::fmt::Display>(e: E) -> CacheError {
        CacheError::Lock(format!("Memory medium lock poisoned: {}", e))
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableMedium for MemoryMedium {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let size_bytes = value.len() as u64;

        if let Some(quota) = self.quota_bytes {
            let others: u64 = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, r)| r.size_bytes)
                .sum();
            let available = quota.saturating_sub(others);
            if size_bytes > available {
                return Err(CacheError::QuotaExceeded {
                    needed: size_bytes,
                    available,
                });
            }
        }

        entries.insert(
            key.to_string(),
            StoredRecord {
                value: value.to_string(),
                cached_at: Utc::now(),
                size_bytes,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().map_err(Self::poisoned)?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries.read().map_err(Self::poisoned)?;
        Ok(CacheStats {
            namespace: self.namespace.clone(),
            entry_count: entries.len(),
            total_size_bytes: entries.values().map(|r| r.size_bytes).sum(),
            max_size_bytes: self.quota_bytes.unwrap_or(0),
            last_modified: entries.values().map(|r| r.cached_at).max(),
        })
    }
}
