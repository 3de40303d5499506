//! Core traits and types for the caching system.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Describes one cacheable request: the endpoint, its parameters and the
/// invalidation tags a successful response provides.
pub trait QueryKey {
  /// Path segments relative to the API base (e.g. `["pokemon", "25"]`).
  ///
  /// Each segment is sent as one percent-encoded path segment, so a segment
  /// containing `/` or `?` never reaches another endpoint.
  fn path_segments(&self) -> Vec<String>;

  /// Display form of the path (e.g. "/pokemon/25"), used in logs and snapshots.
  fn endpoint(&self) -> String {
    format!("/{}", self.path_segments().join("/"))
  }

  /// Query parameters. Sorted so equal requests hash equally.
  fn params(&self) -> BTreeMap<String, String> {
    BTreeMap::new()
  }

  /// Tags attached to the entry once the fetch succeeds.
  fn provides_tags(&self, data: &Value) -> Vec<String>;

  /// Human-readable description used in logs.
  fn description(&self) -> String;

  /// Stable, fixed-length identity of the (path, params) pair.
  fn cache_hash(&self) -> String {
    // JSON keeps segment boundaries, so ["a/b"] and ["a", "b"] differ
    let input = serde_json::json!([self.path_segments(), self.params()]).to_string();

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// A request for this key is in flight
  Pending,
  /// The last request succeeded and its data is cached
  Fulfilled,
  /// The last request failed; the next query will fetch again
  Rejected,
}

/// Serializable image of the cache, used to persist it across restarts.
///
/// Every entry holding data is captured. Entries that were invalidated, or
/// whose latest fetch was pending or rejected when the snapshot was taken,
/// are saved as stale so they are fetched again after a restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
  pub entries: Vec<SnapshotEntry>,
}

impl CacheSnapshot {
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
  pub hash: String,
  pub endpoint: String,
  pub params: BTreeMap<String, String>,
  pub data: Value,
  pub tags: Vec<String>,
  pub stale: bool,
  pub cached_at: DateTime<Utc>,
}
