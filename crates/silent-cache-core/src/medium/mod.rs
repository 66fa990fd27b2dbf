//! Durable media backing the silent cache.
//!
//! - `SqliteMedium`: survives restarts, optional LRU size bound
//! - `MemoryMedium`: process-local, optional byte quota
//!
//! Every medium is scoped to one namespace.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryMedium;
pub use sqlite::SqliteMedium;
pub use traits::{CacheStats, DurableMedium, StoredRecord};
