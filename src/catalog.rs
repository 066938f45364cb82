//! Incremental, cache-backed catalog pagination.
//!
//! A [`CatalogQuery`] follows the [`FilterState`] it was built from. Every
//! filter or sort change selects a new [`QueryKey`]; each key owns a cache entry
//! holding its pages in ascending order. Exactly one page request is in flight
//! at a time, always for the active key, so page N+1 is never issued before
//! page N has been applied. Responses are applied on the owning thread by
//! [`CatalogQuery::poll`] (non-blocking) or [`CatalogQuery::wait_for_page`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{CatalogBackend, VideoQuery};
use crate::constants::constants;
use crate::error::{ApiError, SyncError};
use crate::filter::{FilterState, Filters, QueryKey};
use crate::models::{VideoPage, VideoSummary};
use crate::mutation::Invalidator;
use crate::prefetch::NextPage;

type PageResult = Result<VideoPage, ApiError>;

#[derive(Debug, Clone)]
pub struct CatalogOptions {
  pub page_size: u32,
  pub available_only: bool,
  /// Age after which a cached key is refetched when it becomes active again.
  pub stale_after: Duration,
  pub max_cached_keys: usize,
  /// Pause before the single automatic retry of a failed page.
  pub retry_delay: Duration,
}

impl Default for CatalogOptions {
  fn default() -> Self {
    let c = constants();
    Self {
      page_size: c.page_size,
      available_only: true,
      stale_after: c.stale_after(),
      max_cached_keys: c.max_cached_keys,
      retry_delay: c.retry_delay(),
    }
  }
}

/// One fetched window of the catalog.
#[derive(Debug, Clone)]
pub struct Page {
  pub number: u32,
  pub items: Vec<VideoSummary>,
  pub has_next: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
  #[default]
  Idle,
  Loading,
  LoadingMore,
  Error,
  Success,
}

struct CacheEntry {
  pages: Vec<Page>,
  status: FetchStatus,
  last_requested_page: u32,
  error: Option<ApiError>,
  /// Flattened items in page order, each video id once.
  items: Vec<VideoSummary>,
  seen: HashSet<String>,
  total: u64,
  /// A page reported a continuation but added nothing new.
  exhausted: bool,
  /// Marked by invalidation; the next read refetches from page 1.
  stale: bool,
  fetched_at: Option<Instant>,
  last_used: Instant,
}

impl CacheEntry {
  fn new() -> Self {
    Self {
      pages: Vec::new(),
      status: FetchStatus::Idle,
      last_requested_page: 0,
      error: None,
      items: Vec::new(),
      seen: HashSet::new(),
      total: 0,
      exhausted: false,
      stale: false,
      fetched_at: None,
      last_used: Instant::now(),
    }
  }

  fn needs_refresh(&self, stale_after: Duration) -> bool {
    self.stale || self.fetched_at.is_none_or(|at| at.elapsed() >= stale_after)
  }

  fn has_next(&self) -> bool {
    !self.exhausted && self.pages.last().is_some_and(|p| p.has_next)
  }

  fn last_page(&self) -> u32 {
    self.pages.last().map_or(0, |p| p.number)
  }

  fn clear_pages(&mut self) {
    self.pages.clear();
    self.items.clear();
    self.seen.clear();
    self.exhausted = false;
  }

  /// Append a page and return how many previously unseen videos it carried.
  fn push_page(&mut self, number: u32, page: VideoPage) -> usize {
    let mut fresh = 0;
    for item in &page.items {
      if self.seen.insert(item.id.clone()) {
        self.items.push(item.clone());
        fresh += 1;
      }
    }
    self.total = page.total;
    if page.has_next && fresh == 0 {
      self.exhausted = true;
    }
    self.pages.push(Page { number, items: page.items, has_next: page.has_next });
    fresh
  }

  /// Settle status after the in-flight request for this entry was dropped.
  fn abandon_request(&mut self) {
    if matches!(self.status, FetchStatus::Loading | FetchStatus::LoadingMore) {
      self.status = if self.pages.is_empty() { FetchStatus::Idle } else { FetchStatus::Success };
    }
  }
}

struct InFlight {
  key: QueryKey,
  page: u32,
  /// Page 1 of an entry that already has pages; replaces them on success.
  refresh: bool,
  rx: oneshot::Receiver<PageResult>,
}

pub struct CatalogQuery<B> {
  backend: Arc<B>,
  filters: watch::Receiver<Filters>,
  invalidations: watch::Receiver<u64>,
  options: CatalogOptions,
  key: QueryKey,
  entries: HashMap<QueryKey, CacheEntry>,
  in_flight: Option<InFlight>,
}

impl<B: CatalogBackend> CatalogQuery<B> {
  /// Build a query following `filters` and start loading page 1 of the
  /// current key. Must be called within a tokio runtime.
  pub fn new(backend: Arc<B>, filters: &FilterState, invalidator: &Invalidator, options: CatalogOptions) -> Self {
    let mut filters = filters.subscribe();
    let key = filters.borrow_and_update().key(options.available_only);
    let mut query = Self {
      backend,
      filters,
      invalidations: invalidator.subscribe(),
      options,
      key,
      entries: HashMap::new(),
      in_flight: None,
    };
    query.activate();
    query
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  fn entry(&self) -> Option<&CacheEntry> {
    self.entries.get(&self.key)
  }

  /// Concatenation of every fetched page for the active key, in page order.
  pub fn items(&self) -> &[VideoSummary] {
    self.entry().map_or(&[], |e| e.items.as_slice())
  }

  pub fn pages(&self) -> &[Page] {
    self.entry().map_or(&[], |e| e.pages.as_slice())
  }

  pub fn status(&self) -> FetchStatus {
    self.entry().map_or(FetchStatus::Idle, |e| e.status)
  }

  /// Backend-reported size of the active result set, as of the last page.
  pub fn total(&self) -> u64 {
    self.entry().map_or(0, |e| e.total)
  }

  pub fn last_requested_page(&self) -> u32 {
    self.entry().map_or(0, |e| e.last_requested_page)
  }

  pub fn is_initial_loading(&self) -> bool {
    self.entry().is_some_and(|e| e.status == FetchStatus::Loading && e.pages.is_empty())
  }

  /// Page 1 is being refetched while earlier results stay visible.
  pub fn is_refreshing(&self) -> bool {
    self.entry().is_some_and(|e| e.status == FetchStatus::Loading && !e.pages.is_empty())
  }

  pub fn is_fetching_next_page(&self) -> bool {
    self.status() == FetchStatus::LoadingMore
  }

  pub fn has_next_page(&self) -> bool {
    self.entry().is_some_and(CacheEntry::has_next)
  }

  pub fn is_error(&self) -> bool {
    self.status() == FetchStatus::Error
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.entry().and_then(|e| e.error.as_ref())
  }

  /// Fetch the page after the last one applied.
  ///
  /// No-op while a request is in flight or once the last page reported no
  /// continuation. After a failure this retries the failed page.
  pub fn request_next_page(&mut self) -> bool {
    self.sync();
    if let Some(in_flight) = &self.in_flight {
      debug!(key = %self.key, page = in_flight.page, "catalog: next page already in flight");
      return false;
    }
    let Some(entry) = self.entries.get(&self.key) else {
      return false;
    };
    if entry.status == FetchStatus::Error {
      let page = entry.last_requested_page.max(1);
      let refresh = page == 1 && !entry.pages.is_empty();
      debug!(key = %self.key, page, refresh, "catalog: re-issuing failed page");
      self.start_fetch(page, refresh);
      return true;
    }
    if entry.pages.is_empty() || entry.stale {
      let refresh = !entry.pages.is_empty();
      self.start_fetch(1, refresh);
      return true;
    }
    if !entry.has_next() {
      return false;
    }
    let next = entry.last_page() + 1;
    self.start_fetch(next, false);
    true
  }

  /// Re-issue whatever failed last. Same as [`Self::request_next_page`] while in
  /// the error state; otherwise no-op.
  pub fn retry(&mut self) -> bool {
    self.sync();
    self.is_error() && self.request_next_page()
  }

  /// Apply a finished response, if any, and pick up filter changes and
  /// invalidations. Returns whether visible state changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.sync();
    let Some(in_flight) = &mut self.in_flight else {
      return changed;
    };
    let result = match in_flight.rx.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return changed,
      Err(oneshot::error::TryRecvError::Closed) => {
        warn!(key = %self.key, page = in_flight.page, "catalog: page task ended without a response");
        self.in_flight = None;
        if let Some(entry) = self.entries.get_mut(&self.key) {
          entry.abandon_request();
        }
        return true;
      }
    };
    if let Some(in_flight) = self.in_flight.take() {
      changed |= self.apply(in_flight, result).is_ok();
    }
    changed
  }

  /// Wait for the in-flight page, if any, and apply it. Returns false when
  /// nothing was in flight.
  pub async fn wait_for_page(&mut self) -> bool {
    self.sync();
    let result = match self.in_flight.as_mut() {
      Some(in_flight) => (&mut in_flight.rx).await,
      None => return false,
    };
    let Some(in_flight) = self.in_flight.take() else {
      return false;
    };
    match result {
      Ok(result) => {
        let _ = self.apply(in_flight, result);
      }
      Err(_) => {
        warn!(key = %self.key, page = in_flight.page, "catalog: page task ended without a response");
        if let Some(entry) = self.entries.get_mut(&self.key) {
          entry.abandon_request();
        }
      }
    }
    true
  }

  /// Observe filter changes and invalidations. Returns whether the active key
  /// or its entry was reset.
  ///
  /// Both are settled before anything is fetched, so a filter change and an
  /// invalidation seen in the same poll issue one request for the new key.
  fn sync(&mut self) -> bool {
    let invalidated = self.invalidations.has_changed().unwrap_or(false);
    if invalidated {
      self.invalidations.borrow_and_update();
    }
    let mut switched = false;
    if self.filters.has_changed().unwrap_or(false) {
      let key = self.filters.borrow_and_update().key(self.options.available_only);
      if key != self.key {
        self.cancel_in_flight();
        info!(from = %self.key, to = %key, "catalog: key changed");
        self.key = key;
        switched = true;
      }
    }
    if invalidated {
      self.mark_all_stale();
    }
    if switched || invalidated {
      self.activate();
    }
    switched || invalidated
  }

  fn cancel_in_flight(&mut self) {
    if let Some(dropped) = self.in_flight.take() {
      debug!(key = %dropped.key, page = dropped.page, "catalog: cancelled in-flight page");
      if let Some(entry) = self.entries.get_mut(&dropped.key) {
        entry.abandon_request();
      }
    }
  }

  /// Mark every entry stale; the next activation of each refetches page 1.
  fn mark_all_stale(&mut self) {
    self.cancel_in_flight();
    for entry in self.entries.values_mut() {
      entry.abandon_request();
      entry.stale = true;
    }
  }

  /// Make the active key's entry current: create it, refetch it when empty
  /// or stale, and evict the least recently used entries over the limit.
  fn activate(&mut self) {
    let entry = self.entries.entry(self.key.clone()).or_insert_with(CacheEntry::new);
    entry.last_used = Instant::now();
    let cached_pages = entry.pages.len();
    if cached_pages == 0 || entry.needs_refresh(self.options.stale_after) {
      self.start_fetch(1, cached_pages > 0);
    } else {
      debug!(key = %self.key, pages = cached_pages, "catalog: serving cached pages");
    }
    self.evict();
  }

  fn evict(&mut self) {
    while self.entries.len() > self.options.max_cached_keys.max(1) {
      let oldest = self
        .entries
        .iter()
        .filter(|(key, _)| **key != self.key)
        .min_by_key(|(_, entry)| entry.last_used)
        .map(|(key, _)| key.clone());
      let Some(oldest) = oldest else { break };
      debug!(key = %oldest, "catalog: evicted cached key");
      self.entries.remove(&oldest);
    }
  }

  fn start_fetch(&mut self, page: u32, refresh: bool) {
    let Some(entry) = self.entries.get_mut(&self.key) else {
      return;
    };
    entry.status = if page == 1 { FetchStatus::Loading } else { FetchStatus::LoadingMore };
    entry.last_requested_page = page;
    entry.error = None;

    let query = self.key.to_query(page, self.options.page_size);
    let backend = Arc::clone(&self.backend);
    let retry_delay = self.options.retry_delay;
    let label = format!("{} page {}", self.key, page);
    debug!(key = %self.key, page, refresh, "catalog: requesting page");

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = fetch_with_retry(backend.as_ref(), &query, retry_delay).await;
      if tx.send(result).is_err() {
        debug!(reason = %SyncError::StaleResponseDiscarded { request: label }, "catalog: response ignored");
      }
    });
    self.in_flight = Some(InFlight { key: self.key.clone(), page, refresh, rx });
  }

  fn apply(&mut self, in_flight: InFlight, result: PageResult) -> Result<(), SyncError> {
    if in_flight.key != self.key {
      let stale = SyncError::StaleResponseDiscarded { request: format!("{} page {}", in_flight.key, in_flight.page) };
      debug!(reason = %stale, "catalog: response ignored");
      return Err(stale);
    }
    let Some(entry) = self.entries.get_mut(&self.key) else {
      return Err(SyncError::StaleResponseDiscarded { request: format!("{} page {}", in_flight.key, in_flight.page) });
    };
    match result {
      Ok(page) => {
        if in_flight.refresh {
          entry.clear_pages();
        }
        let fresh = entry.push_page(in_flight.page, page);
        if entry.exhausted {
          warn!(key = %self.key, page = in_flight.page, "catalog: page added nothing new, treating as end");
        }
        if in_flight.page == 1 {
          entry.fetched_at = Some(Instant::now());
          entry.stale = false;
        }
        entry.status = FetchStatus::Success;
        debug!(key = %self.key, page = in_flight.page, fresh, total = entry.items.len(), "catalog: page applied");
      }
      Err(e) => {
        warn!(key = %self.key, page = in_flight.page, err = %e, "catalog: page failed");
        entry.status = FetchStatus::Error;
        entry.error = Some(e);
      }
    }
    Ok(())
  }
}

impl<B: CatalogBackend> NextPage for CatalogQuery<B> {
  fn has_next_page(&self) -> bool {
    CatalogQuery::has_next_page(self)
  }

  fn request_next_page(&mut self) -> bool {
    CatalogQuery::request_next_page(self)
  }
}

/// One attempt plus a single automatic retry.
async fn fetch_with_retry<B: CatalogBackend>(backend: &B, query: &VideoQuery, retry_delay: Duration) -> PageResult {
  match backend.list_videos(query).await {
    Ok(page) => Ok(page),
    Err(e) => {
      warn!(page = query.page, err = %e, "catalog: page failed, retrying once");
      tokio::time::sleep(retry_delay).await;
      backend.list_videos(query).await
    }
  }
}
