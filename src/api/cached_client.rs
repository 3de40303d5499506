//! Catalog client that routes every request through the response cache.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;

use crate::cache::{QueryKey, ResponseCache};
use crate::normalize::normalize_entry;

use super::cache::{is_valid_name, PokeQueryKey, LIST_TAG};
use super::client::Transport;
use super::types::{ListEntry, NormalizedEntry, Page, Pokemon};
use super::FetchError;

/// Catalog client with transparent caching.
///
/// Identical concurrent requests share one upstream fetch; results stay
/// cached until their tags are invalidated.
#[derive(Clone)]
pub struct CachedPokeClient {
  transport: Arc<dyn Transport>,
  cache: ResponseCache,
}

impl CachedPokeClient {
  pub fn new(transport: Arc<dyn Transport>, cache: ResponseCache) -> Self {
    Self { transport, cache }
  }

  pub fn cache(&self) -> &ResponseCache {
    &self.cache
  }

  async fn query<T: DeserializeOwned>(&self, key: PokeQueryKey) -> Result<T, FetchError> {
    let transport = Arc::clone(&self.transport);
    let segments = key.path_segments();
    let params = key.params();

    self
      .cache
      .query(&key, move || transport.fetch(&segments, &params))
      .await
  }

  /// Fetch one catalog page and derive each entry's id.
  pub async fn get_page(&self, offset: u32, limit: u32) -> Result<Page<NormalizedEntry>, FetchError> {
    let page: Page<ListEntry> = self.query(PokeQueryKey::List { limit, offset }).await?;
    Ok(page.map(normalize_entry))
  }

  pub async fn get_by_id(&self, id: u32) -> Result<Pokemon, FetchError> {
    self.query(PokeQueryKey::ById { id }).await
  }

  /// Names are matched case-insensitively. A name that can't address an
  /// entity is reported as not found without a request.
  pub async fn get_by_name(&self, name: &str) -> Result<Pokemon, FetchError> {
    if !is_valid_name(name) {
      return Err(FetchError::NotFound {
        resource: format!("pokemon/{}", name.trim()),
      });
    }
    self.query(PokeQueryKey::by_name(name)).await
  }

  /// Mark every cached entry with this tag stale.
  pub fn invalidate(&self, tag: &str) -> usize {
    self.cache.invalidate(tag)
  }
}

/// Where a paginated list gets its pages from.
pub trait PageSource: Send + Sync + 'static {
  fn load_page(
    &self,
    offset: u32,
    limit: u32,
  ) -> BoxFuture<'static, Result<Page<NormalizedEntry>, FetchError>>;

  /// Drop any cached pages so the next load goes upstream.
  fn invalidate_pages(&self) {}
}

impl PageSource for CachedPokeClient {
  fn load_page(
    &self,
    offset: u32,
    limit: u32,
  ) -> BoxFuture<'static, Result<Page<NormalizedEntry>, FetchError>> {
    let client = self.clone();
    async move { client.get_page(offset, limit).await }.boxed()
  }

  fn invalidate_pages(&self) {
    self.invalidate(LIST_TAG);
  }
}
