//! Silent Cache - stale-while-revalidate caching for client views.
//!
//! Views read their last known data synchronously from a durable store and
//! revalidate in the background; the store is overwritten when the fetch
//! succeeds, and a failed fetch leaves the stale value in place next to the
//! error.
//!
//! # Example
//!
//! ```rust,no_run
//! use silent_cache::{FetchError, SilentCache, SqliteMedium};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = SilentCache::new(SqliteMedium::open("/tmp/silent-cache.sqlite")?);
//!
//!     let mut topics = cache.query("topics", || async {
//!         Ok::<_, FetchError>(vec!["dictation".to_string(), "grammar".to_string()])
//!     });
//!
//!     // Whatever an earlier run cached is available right away
//!     println!("cached: {:?}", topics.snapshot().data);
//!
//!     let fresh = topics.settled().await;
//!     println!("fresh: {:?}", fresh.data);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod medium;
pub mod query;
pub mod store;

pub use config::CacheConfig;
pub use error::{CacheError, FetchError, Result};
pub use fetch::{Fetcher, JsonFetcher};
pub use lifecycle::MountToken;
pub use medium::{CacheStats, DurableMedium, MemoryMedium, SqliteMedium, StoredRecord};
pub use query::{
    CacheValue, QueryOptions, QuerySnapshot, QueryStatus, SilentQuery, SuccessCallback,
};
pub use store::{CachedValue, SilentCache};
