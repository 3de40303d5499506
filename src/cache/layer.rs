//! Response cache: keyed query results with request coalescing and
//! tag-based invalidation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{CacheSnapshot, EntryStatus, QueryKey, SnapshotEntry};
use crate::api::FetchError;

type FetchResult = Result<Value, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type EntryMap = HashMap<String, CacheEntry>;

struct CacheEntry {
  endpoint: String,
  params: BTreeMap<String, String>,
  status: Option<EntryStatus>,
  /// Last successfully fetched data, kept while a re-fetch is in flight
  data: Option<Value>,
  error: Option<FetchError>,
  in_flight: Option<SharedFetch>,
  /// Bumped on every fetch so a superseded request can't overwrite a newer one
  generation: u64,
  tags: BTreeSet<String>,
  subscribers: usize,
  stale: bool,
  cached_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
  fn new<K: QueryKey>(key: &K) -> Self {
    Self {
      endpoint: key.endpoint(),
      params: key.params(),
      status: None,
      data: None,
      error: None,
      in_flight: None,
      generation: 0,
      tags: BTreeSet::new(),
      subscribers: 0,
      stale: false,
      cached_at: None,
    }
  }
}

enum Lookup {
  Hit(Value),
  Wait(SharedFetch),
}

/// Keyed store of query results.
///
/// Concurrent queries for the same key while a request is in flight all await
/// that one request. Fulfilled entries are served until a tag they carry is
/// invalidated. Failed requests are recorded but never retried by the cache
/// itself; the next query for the key fetches again.
pub struct ResponseCache {
  entries: Arc<Mutex<EntryMap>>,
}

impl ResponseCache {
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, EntryMap> {
    lock_entries(&self.entries)
  }

  /// Run a query through the cache and decode the result.
  ///
  /// `fetcher` is only called when no usable entry exists and no request for
  /// the key is already in flight.
  pub async fn query<K, T, F, Fut>(&self, key: &K, fetcher: F) -> Result<T, FetchError>
  where
    K: QueryKey + Clone + Send + Sync + 'static,
    T: DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    let value = self.query_value(key, fetcher).await?;
    Ok(serde_json::from_value(value)?)
  }

  /// Like [`query`](Self::query) but returns the raw JSON value.
  pub async fn query_value<K, F, Fut>(&self, key: &K, fetcher: F) -> FetchResult
  where
    K: QueryKey + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    match self.lookup(key, fetcher) {
      Lookup::Hit(value) => Ok(value),
      Lookup::Wait(shared) => shared.await,
    }
  }

  fn lookup<K, F, Fut>(&self, key: &K, fetcher: F) -> Lookup
  where
    K: QueryKey + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    let hash = key.cache_hash();
    let mut entries = self.lock();
    let entry = entries
      .entry(hash.clone())
      .or_insert_with(|| CacheEntry::new(key));

    if let Some(shared) = &entry.in_flight {
      debug!(query = %key.description(), "Joining in-flight request");
      return Lookup::Wait(shared.clone());
    }

    if entry.status == Some(EntryStatus::Fulfilled) && !entry.stale {
      if let Some(data) = &entry.data {
        debug!(query = %key.description(), "Cache hit");
        return Lookup::Hit(data.clone());
      }
    }

    entry.generation += 1;
    entry.stale = false;
    entry.status = Some(EntryStatus::Pending);
    debug!(query = %key.description(), generation = entry.generation, "Fetching");

    let shared = settle_on_completion(
      Arc::clone(&self.entries),
      hash,
      entry.generation,
      key.clone(),
      fetcher(),
    );
    entry.in_flight = Some(shared.clone());
    Lookup::Wait(shared)
  }

  /// Mark every entry carrying `tag` stale. Returns how many were marked.
  pub fn invalidate(&self, tag: &str) -> usize {
    let mut entries = self.lock();
    let mut marked = 0;
    for entry in entries.values_mut().filter(|e| e.tags.contains(tag)) {
      entry.stale = true;
      marked += 1;
    }
    debug!(tag, marked, "Invalidated tag");
    marked
  }

  /// Register interest in a key. The count drops again when the returned
  /// guard is dropped.
  pub fn subscribe<K: QueryKey>(&self, key: &K) -> Subscription {
    let hash = key.cache_hash();
    let mut entries = self.lock();
    let entry = entries
      .entry(hash.clone())
      .or_insert_with(|| CacheEntry::new(key));
    entry.subscribers += 1;

    Subscription {
      entries: Arc::clone(&self.entries),
      hash,
    }
  }

  pub fn subscriber_count<K: QueryKey>(&self, key: &K) -> usize {
    self
      .lock()
      .get(&key.cache_hash())
      .map_or(0, |e| e.subscribers)
  }

  pub fn entry_status<K: QueryKey>(&self, key: &K) -> Option<EntryStatus> {
    self.lock().get(&key.cache_hash()).and_then(|e| e.status)
  }

  /// Error recorded by the last failed fetch for this key.
  pub fn entry_error<K: QueryKey>(&self, key: &K) -> Option<FetchError> {
    self
      .lock()
      .get(&key.cache_hash())
      .and_then(|e| e.error.clone())
  }

  pub fn is_stale<K: QueryKey>(&self, key: &K) -> bool {
    self
      .lock()
      .get(&key.cache_hash())
      .is_some_and(|e| e.stale)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Capture every entry holding data, for persistence.
  pub fn snapshot(&self) -> CacheSnapshot {
    let entries = self.lock();
    let mut snapshot: Vec<SnapshotEntry> = entries
      .iter()
      .filter_map(|(hash, entry)| {
        let data = entry.data.clone()?;
        Some(SnapshotEntry {
          hash: hash.clone(),
          endpoint: entry.endpoint.clone(),
          params: entry.params.clone(),
          data,
          tags: entry.tags.iter().cloned().collect(),
          // Data that outlived a failed or pending re-fetch is not current
          stale: entry.stale || entry.status != Some(EntryStatus::Fulfilled),
          cached_at: entry.cached_at.unwrap_or_else(Utc::now),
        })
      })
      .collect();
    snapshot.sort_by(|a, b| a.hash.cmp(&b.hash));

    CacheSnapshot { entries: snapshot }
  }

  /// Rehydrate from a snapshot. Keys already present are left untouched.
  /// Returns the number of entries restored.
  pub fn restore(&self, snapshot: CacheSnapshot) -> usize {
    let mut entries = self.lock();
    let mut restored = 0;
    for saved in snapshot.entries {
      if entries.contains_key(&saved.hash) {
        continue;
      }
      entries.insert(
        saved.hash,
        CacheEntry {
          endpoint: saved.endpoint,
          params: saved.params,
          status: Some(EntryStatus::Fulfilled),
          data: Some(saved.data),
          error: None,
          in_flight: None,
          generation: 0,
          tags: saved.tags.into_iter().collect(),
          subscribers: 0,
          stale: saved.stale,
          cached_at: Some(saved.cached_at),
        },
      );
      restored += 1;
    }
    debug!(restored, "Restored cache snapshot");
    restored
  }
}

impl Default for ResponseCache {
  fn default() -> Self {
    Self::new()
  }
}

impl Clone for ResponseCache {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
    }
  }
}

/// Reference-counting guard returned by [`ResponseCache::subscribe`].
pub struct Subscription {
  entries: Arc<Mutex<EntryMap>>,
  hash: String,
}

impl Subscription {
  pub fn unsubscribe(self) {
    drop(self);
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(entry) = lock_entries(&self.entries).get_mut(&self.hash) {
      entry.subscribers = entry.subscribers.saturating_sub(1);
    }
  }
}

fn lock_entries(entries: &Mutex<EntryMap>) -> MutexGuard<'_, EntryMap> {
  // Entry updates are single assignments, so a poisoned map is still consistent
  entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Wrap a fetch so that whichever caller drives it to completion records the
/// outcome in the entry, unless a newer fetch for the key has started since.
fn settle_on_completion<K, Fut>(
  entries: Arc<Mutex<EntryMap>>,
  hash: String,
  generation: u64,
  key: K,
  fetch: Fut,
) -> SharedFetch
where
  K: QueryKey + Send + 'static,
  Fut: Future<Output = FetchResult> + Send + 'static,
{
  async move {
    let result = fetch.await;

    let mut entries = lock_entries(&entries);
    if let Some(entry) = entries.get_mut(&hash) {
      if entry.generation == generation {
        entry.in_flight = None;
        match &result {
          Ok(data) => {
            entry.tags.extend(key.provides_tags(data));
            entry.data = Some(data.clone());
            entry.error = None;
            entry.status = Some(EntryStatus::Fulfilled);
            entry.cached_at = Some(Utc::now());
          }
          Err(e) => {
            warn!(query = %key.description(), error = %e, "Fetch rejected");
            entry.error = Some(e.clone());
            entry.status = Some(EntryStatus::Rejected);
          }
        }
      }
    }

    result
  }
  .boxed()
  .shared()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[derive(Clone)]
  struct TestKey {
    id: u32,
  }

  impl QueryKey for TestKey {
    fn path_segments(&self) -> Vec<String> {
      vec!["thing".to_string(), self.id.to_string()]
    }

    fn provides_tags(&self, _data: &Value) -> Vec<String> {
      vec![format!("thing:{}", self.id), "things".to_string()]
    }

    fn description(&self) -> String {
      format!("thing {}", self.id)
    }
  }

  fn counting_fetcher(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
  ) -> impl FnOnce() -> BoxFuture<'static, FetchResult> {
    let calls = Arc::clone(calls);
    move || {
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(delay).await;
        Ok(json!({ "fetch": n }))
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_concurrent_queries_share_one_fetch() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = TestKey { id: 1 };

    let (a, b, c) = tokio::join!(
      cache.query_value(&key, counting_fetcher(&calls, Duration::from_millis(20))),
      cache.query_value(&key, counting_fetcher(&calls, Duration::from_millis(20))),
      cache.query_value(&key, counting_fetcher(&calls, Duration::from_millis(20))),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap(), json!({ "fetch": 1 }));
    assert_eq!(b.unwrap(), json!({ "fetch": 1 }));
    assert_eq!(c.unwrap(), json!({ "fetch": 1 }));
  }

  #[tokio::test]
  async fn test_fulfilled_entry_is_served_from_cache() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = TestKey { id: 1 };

    cache
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    let second = cache
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(second, json!({ "fetch": 1 }));
    assert_eq!(cache.entry_status(&key), Some(EntryStatus::Fulfilled));
  }

  #[tokio::test]
  async fn test_distinct_keys_fetch_independently() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .query_value(&TestKey { id: 1 }, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache
      .query_value(&TestKey { id: 2 }, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 2);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch_of_tagged_entries_only() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let one = TestKey { id: 1 };
    let two = TestKey { id: 2 };

    cache
      .query_value(&one, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache
      .query_value(&two, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(cache.invalidate("thing:1"), 1);
    assert!(cache.is_stale(&one));
    assert!(!cache.is_stale(&two));

    let refreshed = cache
      .query_value(&one, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache
      .query_value(&two, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(refreshed, json!({ "fetch": 3 }));
    assert!(!cache.is_stale(&one));

    assert_eq!(cache.invalidate("things"), 2);
    assert_eq!(cache.invalidate("unknown"), 0);
  }

  #[tokio::test]
  async fn test_rejected_entry_is_recorded_then_refetched() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 7 };

    let err = cache
      .query_value(&key, || async { Err(FetchError::network("connection refused")) })
      .await
      .unwrap_err();

    assert_eq!(err, FetchError::network("connection refused"));
    assert_eq!(cache.entry_status(&key), Some(EntryStatus::Rejected));
    assert_eq!(cache.entry_error(&key), Some(err));

    let value = cache
      .query_value(&key, || async { Ok(json!({ "ok": true })) })
      .await
      .unwrap();

    assert_eq!(value, json!({ "ok": true }));
    assert_eq!(cache.entry_status(&key), Some(EntryStatus::Fulfilled));
    assert_eq!(cache.entry_error(&key), None);
  }

  #[tokio::test]
  async fn test_invalidate_during_flight_leaves_entry_stale() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = TestKey { id: 1 };

    cache
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    cache.invalidate("thing:1");

    let pending = cache.query_value(&key, counting_fetcher(&calls, Duration::from_millis(20)));
    let (result, marked) = tokio::join!(pending, async { cache.invalidate("thing:1") });

    assert_eq!(result.unwrap(), json!({ "fetch": 2 }));
    assert_eq!(marked, 1);
    assert!(cache.is_stale(&key));
  }

  #[tokio::test]
  async fn test_query_decodes_typed_result() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 3 };

    let n: u32 = cache
      .query(&key, || async { Ok(json!(42)) })
      .await
      .unwrap();
    assert_eq!(n, 42);

    let bad: Result<String, _> = cache.query(&key, || async { Ok(json!(0)) }).await;
    assert!(matches!(bad, Err(FetchError::Decode { .. })));
  }

  #[test]
  fn test_subscriptions_are_reference_counted() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 1 };

    let first = cache.subscribe(&key);
    let second = cache.subscribe(&key);
    assert_eq!(cache.subscriber_count(&key), 2);

    first.unsubscribe();
    assert_eq!(cache.subscriber_count(&key), 1);

    drop(second);
    assert_eq!(cache.subscriber_count(&key), 0);
    // Unreferenced entries stay put
    assert_eq!(cache.len(), 1);
  }

  #[tokio::test]
  async fn test_snapshot_restore_serves_without_fetching() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 9 };
    cache
      .query_value(&key, || async { Ok(json!({ "name": "mew" })) })
      .await
      .unwrap();
    cache
      .query_value(&TestKey { id: 10 }, || async {
        Err(FetchError::network("timeout"))
      })
      .await
      .unwrap_err();

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].tags, vec!["thing:9", "things"]);

    let serialized = serde_json::to_string(&snapshot).unwrap();
    let restored_snapshot: CacheSnapshot = serde_json::from_str(&serialized).unwrap();

    let rehydrated = ResponseCache::new();
    assert_eq!(rehydrated.restore(restored_snapshot), 1);

    let calls = Arc::new(AtomicUsize::new(0));
    let value = rehydrated
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(value, json!({ "name": "mew" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Restored tags still drive invalidation
    assert_eq!(rehydrated.invalidate("thing:9"), 1);
  }

  #[tokio::test]
  async fn test_invalidated_entry_is_refetched_after_restore() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 4 };
    cache
      .query_value(&key, || async { Ok(json!({ "v": "old" })) })
      .await
      .unwrap();
    cache.invalidate("thing:4");

    let snapshot = cache.snapshot();
    assert!(snapshot.entries[0].stale);

    let rehydrated = ResponseCache::new();
    rehydrated.restore(snapshot);
    assert!(rehydrated.is_stale(&key));

    let calls = Arc::new(AtomicUsize::new(0));
    let value = rehydrated
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(value, json!({ "fetch": 1 }));
  }

  #[tokio::test]
  async fn test_data_behind_a_rejected_refetch_is_saved_stale() {
    let cache = ResponseCache::new();
    let key = TestKey { id: 5 };
    cache
      .query_value(&key, || async { Ok(json!({ "v": "old" })) })
      .await
      .unwrap();
    cache.invalidate("thing:5");
    cache
      .query_value(&key, || async { Err(FetchError::network("offline")) })
      .await
      .unwrap_err();

    assert_eq!(cache.entry_status(&key), Some(EntryStatus::Rejected));
    assert!(!cache.is_stale(&key));

    let snapshot = cache.snapshot();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].data, json!({ "v": "old" }));
    assert!(snapshot.entries[0].stale);
  }

  #[tokio::test]
  async fn test_restore_leaves_live_entries_alone() {
    let saved = ResponseCache::new();
    let key = TestKey { id: 6 };
    saved
      .query_value(&key, || async { Ok(json!({ "v": "saved" })) })
      .await
      .unwrap();
    saved
      .query_value(&TestKey { id: 7 }, || async { Ok(json!({ "v": "other" })) })
      .await
      .unwrap();

    let live = ResponseCache::new();
    live
      .query_value(&key, || async { Ok(json!({ "v": "live" })) })
      .await
      .unwrap();

    assert_eq!(live.restore(saved.snapshot()), 1);
    assert_eq!(live.len(), 2);

    let calls = Arc::new(AtomicUsize::new(0));
    let value = live
      .query_value(&key, counting_fetcher(&calls, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(value, json!({ "v": "live" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }
}
