//! Cache storage trait and SQLite implementation.
//!
//! Storage only sees whole snapshots: the cache is written at shutdown and
//! read back at startup.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CacheSnapshot, SnapshotEntry};

/// Trait for cache persistence backends.
pub trait CacheStorage: Send + Sync {
  /// Replace whatever was stored with this snapshot.
  fn save(&self, snapshot: &CacheSnapshot) -> Result<()>;

  /// Load the stored snapshot, if any.
  fn load(&self) -> Result<Option<CacheSnapshot>>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn save(&self, _snapshot: &CacheSnapshot) -> Result<()> {
    Ok(()) // Discard
  }

  fn load(&self) -> Result<Option<CacheSnapshot>> {
    Ok(None) // Nothing stored
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pokedex").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per fulfilled query result (payload stored as JSON)
CREATE TABLE IF NOT EXISTS cache_entries (
    hash TEXT PRIMARY KEY,
    endpoint TEXT NOT NULL,
    params TEXT NOT NULL,
    data BLOB NOT NULL,
    tags TEXT NOT NULL,
    stale INTEGER NOT NULL DEFAULT 0,
    cached_at TEXT NOT NULL
);
"#;

impl CacheStorage for SqliteStorage {
  fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries", [])
      .map_err(|e| eyre!("Failed to clear cache entries: {}", e))?;

    for entry in &snapshot.entries {
      let params_json = serde_json::to_string(&entry.params)
        .map_err(|e| eyre!("Failed to serialize params: {}", e))?;
      let data =
        serde_json::to_vec(&entry.data).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;
      let tags_json =
        serde_json::to_string(&entry.tags).map_err(|e| eyre!("Failed to serialize tags: {}", e))?;

      tx.execute(
        "INSERT INTO cache_entries (hash, endpoint, params, data, tags, stale, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
          entry.hash,
          entry.endpoint,
          params_json,
          data,
          tags_json,
          entry.stale,
          entry.cached_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn load(&self) -> Result<Option<CacheSnapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT hash, endpoint, params, data, tags, stale, cached_at FROM cache_entries
         ORDER BY hash",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    type Row = (String, String, String, Vec<u8>, String, bool, String);
    let rows: Vec<Row> = stmt
      .query_map([], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query cache entries: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    if rows.is_empty() {
      return Ok(None);
    }

    let mut entries = Vec::with_capacity(rows.len());
    for (hash, endpoint, params_json, data, tags_json, stale, cached_at) in rows {
      entries.push(SnapshotEntry {
        hash,
        endpoint,
        params: serde_json::from_str(&params_json)
          .map_err(|e| eyre!("Failed to deserialize params: {}", e))?,
        data: serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize entry: {}", e))?,
        tags: serde_json::from_str(&tags_json)
          .map_err(|e| eyre!("Failed to deserialize tags: {}", e))?,
        stale,
        cached_at: parse_datetime(&cached_at)?,
      });
    }

    Ok(Some(CacheSnapshot { entries }))
  }
}

/// Parse an RFC 3339 timestamp as written by `save`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
