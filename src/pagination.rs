//! Infinite-scroll accumulation of offset-based catalog pages.
//!
//! `PagedList` turns a series of independent page fetches into one ordered
//! list, unique by locator. It is a small state machine:
//!
//! ```text
//! Idle -> LoadingInitial -> Ready <-> LoadingMore
//!              |                          |
//!              +--------> Error <---------+
//! ```
//!
//! Fetches run on spawned tasks and report back over a channel tagged with the
//! session and offset they were issued for. `poll()` applies them; anything
//! from an older session or for an offset that is no longer pending is dropped.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::cached_client::PageSource;
use crate::api::types::{NormalizedEntry, Page};
use crate::api::FetchError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
  Idle,
  LoadingInitial,
  Ready,
  LoadingMore,
  Error,
}

/// Ordered entries, unique by `url`.
///
/// Ids can collapse to 0 for malformed locators, so they are not a usable
/// identity; the locator is.
#[derive(Debug, Clone, Default)]
pub struct AccumulatedList {
  items: Vec<NormalizedEntry>,
  urls: HashSet<String>,
}

impl AccumulatedList {
  /// Merge one page. Offset 0 replaces the list; other offsets append the
  /// entries not seen yet, in response order. Returns how many were added.
  pub fn merge(&mut self, offset: u32, entries: Vec<NormalizedEntry>) -> usize {
    if offset == 0 {
      self.clear();
    }

    let before = self.items.len();
    for entry in entries {
      if self.urls.insert(entry.url.clone()) {
        self.items.push(entry);
      }
    }
    self.items.len() - before
  }

  pub fn clear(&mut self) {
    self.items.clear();
    self.urls.clear();
  }

  pub fn items(&self) -> &[NormalizedEntry] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// What a list view renders from.
#[derive(Debug)]
pub struct ListView<'a> {
  pub items: &'a [NormalizedEntry],
  pub is_loading_initial: bool,
  pub is_loading_more: bool,
  pub has_more: bool,
  pub error: Option<&'a FetchError>,
}

/// A page fetch result, tagged with the request it answers.
#[derive(Debug)]
struct PageResult {
  session: u64,
  offset: u32,
  result: Result<Page<NormalizedEntry>, FetchError>,
}

pub struct PagedList<S: PageSource> {
  source: S,
  page_size: u32,
  state: ListState,
  list: AccumulatedList,
  /// Offset of the last merged page
  offset: u32,
  has_more: bool,
  session: u64,
  /// Offset of the request in flight for the current session
  pending: Option<u32>,
  error: Option<FetchError>,
  tx: mpsc::UnboundedSender<PageResult>,
  rx: mpsc::UnboundedReceiver<PageResult>,
}

impl<S: PageSource> PagedList<S> {
  pub fn new(source: S, page_size: u32) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      source,
      page_size: page_size.max(1),
      state: ListState::Idle,
      list: AccumulatedList::default(),
      offset: 0,
      has_more: true,
      session: 0,
      pending: None,
      error: None,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> ListState {
    self.state
  }

  pub fn items(&self) -> &[NormalizedEntry] {
    self.list.items()
  }

  pub fn has_more(&self) -> bool {
    self.has_more
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, ListState::LoadingInitial | ListState::LoadingMore)
  }

  pub fn view(&self) -> ListView<'_> {
    ListView {
      items: self.list.items(),
      is_loading_initial: self.state == ListState::LoadingInitial,
      is_loading_more: self.state == ListState::LoadingMore,
      has_more: self.has_more,
      error: self.error.as_ref(),
    }
  }

  /// Start the first session. Does nothing once the list has been mounted.
  pub fn mount(&mut self) {
    if self.state == ListState::Idle {
      self.begin_session();
    }
  }

  /// Request the next page.
  ///
  /// Only honoured when the list is `Ready`, more pages exist and nothing is
  /// in flight; otherwise the call is dropped. Returns whether a fetch was
  /// issued.
  pub fn load_more(&mut self) -> bool {
    if self.state != ListState::Ready || !self.has_more || self.pending.is_some() {
      return false;
    }

    let Some(next) = self.offset.checked_add(self.page_size) else {
      // No page can start past the last representable offset
      warn!(offset = self.offset, page_size = self.page_size, "Offset space exhausted");
      self.has_more = false;
      return false;
    };

    self.state = ListState::LoadingMore;
    self.request(next);
    true
  }

  /// Throw the session away and load from offset 0 again.
  pub fn retry(&mut self) {
    info!(session = self.session, "Retrying list from the first page");
    self.begin_session();
  }

  /// Like `retry`, but also drops cached pages so they are fetched fresh.
  pub fn refresh(&mut self) {
    self.source.invalidate_pages();
    self.begin_session();
  }

  /// Apply every finished fetch. Returns `true` if the view changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(result) = self.rx.try_recv() {
      changed |= self.apply(result);
    }
    changed
  }

  fn begin_session(&mut self) {
    self.session += 1;
    self.offset = 0;
    self.list.clear();
    self.has_more = true;
    self.error = None;
    self.state = ListState::LoadingInitial;
    self.request(0);
  }

  fn request(&mut self, offset: u32) {
    self.pending = Some(offset);
    debug!(session = self.session, offset, "Requesting page");

    let future = self.source.load_page(offset, self.page_size);
    let tx = self.tx.clone();
    let session = self.session;
    tokio::spawn(async move {
      let result = future.await;
      // Receiver lives as long as the list; a send error means it was dropped
      let _ = tx.send(PageResult {
        session,
        offset,
        result,
      });
    });
  }

  fn apply(&mut self, page: PageResult) -> bool {
    if page.session != self.session || self.pending != Some(page.offset) {
      warn!(
        session = page.session,
        offset = page.offset,
        current_session = self.session,
        "Discarding superseded page response"
      );
      return false;
    }
    self.pending = None;

    match page.result {
      Ok(data) => {
        let has_next = data.has_next();
        let added = self.list.merge(page.offset, data.results);
        debug!(
          offset = page.offset,
          added,
          total = self.list.len(),
          has_next,
          "Merged page"
        );
        self.offset = page.offset;
        self.has_more = has_next;
        self.error = None;
        self.state = ListState::Ready;
      }
      Err(e) => {
        warn!(offset = page.offset, error = %e, "Page load failed");
        self.error = Some(e);
        self.state = ListState::Error;
      }
    }
    true
  }
}
