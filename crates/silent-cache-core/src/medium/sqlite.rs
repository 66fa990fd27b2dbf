//! SQLite-backed durable medium.

use super::traits::{CacheStats, DurableMedium, StoredRecord};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// SQLite-based durable medium.
///
/// All namespaces share one `cache_entries` table; an instance only ever
/// touches rows of its own namespace. Thread-safe via an internal mutex on
/// the connection.
///
/// Recency is an `access_seq` counter allocated inside SQLite on every read
/// and write, so connections sharing a database file agree on LRU order.
pub struct SqliteMedium {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
    config: CacheConfig,
}

impl SqliteMedium {
    /// Open (or create) a medium at the given database path with default configuration.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, CacheConfig::default())
    }

    /// Open (or create) a medium with custom configuration.
    pub fn with_config(db_path: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CacheError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(db_path).map_err(|e| CacheError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        Self::from_connection(conn, config)
    }

    /// In-memory SQLite database; nothing outlives the process.
    pub fn in_memory(config: CacheConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, config)
    }

    fn from_connection(conn: Connection, config: CacheConfig) -> Result<Self> {
        // WAL keeps readers from blocking on the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CacheError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::init_schema(&conn)?;

        debug!(
            "Opened sqlite cache medium for namespace '{}'",
            config.namespace
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                access_seq INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            -- Index for LRU eviction
            CREATE INDEX IF NOT EXISTS idx_cache_access
                ON cache_entries(namespace, access_seq);

            -- Index for allocating the next access_seq
            CREATE INDEX IF NOT EXISTS idx_cache_seq
                ON cache_entries(access_seq);
            "#,
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CacheError::Lock(format!("Failed to lock database: {}", e)))
    }

    /// Evict least recently accessed entries until the namespace fits in `max_bytes`.
    ///
    /// `keep` is never evicted, so a freshly written value survives even when
    /// it alone exceeds the limit. Returns the number of entries evicted.
    pub fn evict_to_size(&self, max_bytes: u64, keep: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;
        let namespace = self.config.namespace.as_str();

        let current_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if (current_size as u64) <= max_bytes {
            return Ok(0);
        }

        let excess = current_size as u64 - max_bytes;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT key, size_bytes
                FROM cache_entries
                WHERE namespace = ?1
                ORDER BY access_seq ASC
                "#,
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to prepare eviction query: {}", e),
                source: Some(e),
            })?;

        let entries: Vec<(String, i64)> = stmt
            .query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| CacheError::Database {
                message: format!("Failed to query for eviction: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        drop(stmt);

        let mut evicted_bytes = 0u64;
        let mut evicted_count = 0;

        for (key, size) in entries {
            if evicted_bytes >= excess {
                break;
            }
            if keep == Some(key.as_str()) {
                continue;
            }

            conn.execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )?;

            evicted_bytes += size as u64;
            evicted_count += 1;
        }

        debug!(
            "Evicted {} entries ({} bytes) from namespace '{}'",
            evicted_count, evicted_bytes, namespace
        );

        Ok(evicted_count)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl DurableMedium for SqliteMedium {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn read(&self, key: &str) -> Result<Option<StoredRecord>> {
        let conn = self.lock()?;
        let namespace = self.config.namespace.as_str();

        let row: Option<(String, String, i64)> = conn
            .query_row(
                r#"
                SELECT value, cached_at, size_bytes
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2
                "#,
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| CacheError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let Some((value, cached_at, size_bytes)) = row else {
            return Ok(None);
        };

        // Recency bookkeeping only; a failure here must not hide the value
        let _ = conn.execute(
            r#"
            UPDATE cache_entries
            SET access_seq = (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM cache_entries)
            WHERE namespace = ?1 AND key = ?2
            "#,
            params![namespace, key],
        );

        Ok(Some(StoredRecord {
            value,
            cached_at: parse_timestamp(&cached_at),
            size_bytes: size_bytes as u64,
        }))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, value, cached_at, size_bytes, access_seq)
            VALUES (?1, ?2, ?3, ?4, ?5,
                (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM cache_entries))
            "#,
            params![
                self.config.namespace,
                key,
                value,
                Utc::now().to_rfc3339(),
                value.len() as i64
            ],
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to write cache entry: {}", e),
            source: Some(e),
        })?;

        // Release lock before checking eviction
        drop(conn);

        if self.config.is_bounded() {
            if let Err(e) = self.evict_to_size(self.config.max_size_bytes, Some(key)) {
                warn!("Cache eviction failed: {}", e);
            }
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.lock()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![self.config.namespace, key],
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to remove cache entry: {}", e),
                source: Some(e),
            })?;

        Ok(deleted > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT key FROM cache_entries WHERE namespace = ?1 ORDER BY key")
            .map_err(|e| CacheError::Database {
                message: format!("Failed to prepare key listing: {}", e),
                source: Some(e),
            })?;

        let keys = stmt
            .query_map(params![self.config.namespace], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(keys)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![self.config.namespace],
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to clear namespace: {}", e),
                source: Some(e),
            })?;

        debug!(
            "Cleared {} entries from namespace '{}'",
            deleted, self.config.namespace
        );

        Ok(deleted)
    }

    fn stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;

        let (count, size, last_modified): (i64, i64, Option<String>) = conn
            .query_row(
                r#"
                SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), MAX(cached_at)
                FROM cache_entries
                WHERE namespace = ?1
                "#,
                params![self.config.namespace],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to query cache stats: {}", e),
                source: Some(e),
            })?;

        Ok(CacheStats {
            namespace: self.config.namespace.clone(),
            entry_count: count as usize,
            total_size_bytes: size as u64,
            max_size_bytes: self.config.max_size_bytes,
            last_modified: last_modified.as_deref().map(parse_timestamp),
        })
    }
}
