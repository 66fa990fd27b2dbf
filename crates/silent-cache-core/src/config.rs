//! Centralized configuration for the silent cache.
//!
//! Constants for default paths and network behavior, plus the serializable
//! `CacheConfig` that durable media are opened with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "silent-cache";
    pub const DB_FILE_NAME: &'static str = "cache.sqlite";
}

/// Defaults for cache media.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const NAMESPACE: &'static str = "silent-cache";
    /// 0 means unbounded.
    pub const MAX_SIZE_BYTES: u64 = 0;
}

/// Network-related configuration for the built-in fetchers.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = concat!("silent-cache/", env!("CARGO_PKG_VERSION"));
}

/// Configuration for a durable medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CacheConfig {
    /// Partition of the medium this cache reads and writes.
    pub namespace: String,
    /// Maximum total size of stored values in bytes (0 = unlimited).
    pub max_size_bytes: u64,
    /// Whether to evict least recently accessed entries once the size limit is exceeded.
    pub enable_eviction: bool,
}

impl CacheConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Whether writes should be followed by an eviction check.
    pub fn is_bounded(&self) -> bool {
        self.enable_eviction && self.max_size_bytes > 0
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: CacheDefaults::NAMESPACE.to_string(),
            max_size_bytes: CacheDefaults::MAX_SIZE_BYTES,
            enable_eviction: true,
        }
    }
}
