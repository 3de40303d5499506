//! Generic response cache.
//!
//! This module provides an API-agnostic caching mechanism that:
//! - Stores query results keyed by (endpoint, params)
//! - Coalesces concurrent requests for the same key into one fetch
//! - Invalidates entries by tag so the next query re-fetches
//! - Snapshots its state for persistence across restarts

mod layer;
mod storage;
mod traits;

pub use layer::{ResponseCache, Subscription};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use traits::{CacheSnapshot, EntryStatus, QueryKey, SnapshotEntry};
