//! Debounced tag-name completion.
//!
//! Input is coalesced by a quiescence window before anything is sent. Every
//! request gets the next sequence number, and a response is shown only if it
//! carries the latest number issued: a slow early response can never replace a
//! later one. Blank input clears suggestions at once and supersedes anything
//! still in flight.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::api::CatalogBackend;
use crate::constants::constants;
use crate::debounce::Debounce;
use crate::error::{ApiError, SyncError};
use crate::models::Tag;
use crate::mutation::{Invalidator, TagCache};

struct Reply {
  seq: u64,
  generation: u64,
  query: String,
  result: Result<Vec<Tag>, ApiError>,
}

pub struct SuggestionQuery<B> {
  backend: Arc<B>,
  cache: TagCache,
  invalidations: watch::Receiver<u64>,
  debounce: Debounce,
  limit: usize,
  input: String,
  /// Latest sequence number issued; only replies carrying it are applied.
  seq: u64,
  applied: u64,
  suggestions: Vec<Tag>,
  error: Option<ApiError>,
  tx: mpsc::UnboundedSender<Reply>,
  rx: mpsc::UnboundedReceiver<Reply>,
}

impl<B: CatalogBackend> SuggestionQuery<B> {
  pub fn new(backend: Arc<B>, invalidator: &Invalidator) -> Self {
    Self::with_settings(backend, invalidator, constants().debounce(), constants().suggestion_limit)
  }

  pub fn with_settings(backend: Arc<B>, invalidator: &Invalidator, window: Duration, limit: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      backend,
      cache: invalidator.tag_cache(),
      invalidations: invalidator.subscribe(),
      debounce: Debounce::new(window),
      limit,
      input: String::new(),
      seq: 0,
      applied: 0,
      suggestions: Vec::new(),
      error: None,
      tx,
      rx,
    }
  }

  pub fn input(&self) -> &str {
    &self.input
  }

  pub fn suggestions(&self) -> &[Tag] {
    &self.suggestions
  }

  pub fn error(&self) -> Option<&ApiError> {
    self.error.as_ref()
  }

  /// Waiting on the quiescence window or on the latest response.
  pub fn is_pending(&self) -> bool {
    self.debounce.is_armed() || self.applied != self.seq
  }

  /// Time until the quiescence window closes, if one is running.
  pub fn next_deadline(&self) -> Option<Duration> {
    self.debounce.remaining()
  }

  /// Whether the trimmed input equals a suggestion's name, ignoring case.
  pub fn has_exact_match(&self) -> bool {
    let needle = self.input.trim().to_lowercase();
    !needle.is_empty() && self.suggestions.iter().any(|t| t.name.to_lowercase() == needle)
  }

  /// The trimmed input, when it could become a new tag.
  pub fn create_candidate(&self) -> Option<&str> {
    let trimmed = self.input.trim();
    (!trimmed.is_empty() && !self.has_exact_match()).then_some(trimmed)
  }

  pub fn set_input(&mut self, text: &str) {
    if text == self.input {
      return;
    }
    self.input = text.to_string();
    if self.input.trim().is_empty() {
      self.debounce.cancel();
      self.applied = self.supersede();
      self.suggestions.clear();
      self.error = None;
    } else {
      self.debounce.arm();
    }
  }

  pub fn clear(&mut self) {
    self.set_input("");
  }

  /// Issue a due request, apply arrived responses, and refresh after an
  /// invalidation. Returns whether visible suggestions changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    if self.invalidations.has_changed().unwrap_or(false) {
      self.invalidations.borrow_and_update();
      if !self.input.trim().is_empty() {
        debug!(query = %self.input.trim(), "suggest: refreshing after invalidation");
        self.debounce.cancel();
        changed |= self.issue();
      }
    }
    if self.debounce.fire() {
      changed |= self.issue();
    }
    while let Ok(reply) = self.rx.try_recv() {
      changed |= self.apply(reply).is_ok();
    }
    changed
  }

  /// Count a request that will never be sent, so every older reply is stale.
  fn supersede(&mut self) -> u64 {
    self.seq += 1;
    self.seq
  }

  /// Returns true when the request was answered from the cache.
  fn issue(&mut self) -> bool {
    let query = self.input.trim().to_string();
    let seq = self.supersede();
    if let Some(hit) = self.cache.get(&query) {
      debug!(query = %query, seq, "suggest: cache hit");
      self.suggestions = hit;
      self.error = None;
      self.applied = seq;
      return true;
    }

    debug!(query = %query, seq, "suggest: requesting");
    let backend = Arc::clone(&self.backend);
    let tx = self.tx.clone();
    let limit = self.limit;
    let generation = *self.invalidations.borrow();
    tokio::spawn(async move {
      let result = backend.search_tags(Some(&query), limit).await;
      let _ = tx.send(Reply { seq, generation, query, result });
    });
    false
  }

  fn apply(&mut self, reply: Reply) -> Result<(), SyncError> {
    let current = *self.invalidations.borrow() == reply.generation;
    if let (Ok(tags), true) = (&reply.result, current) {
      self.cache.insert(reply.query.clone(), tags.clone());
    }
    if reply.seq != self.seq {
      let stale = SyncError::StaleResponseDiscarded { request: format!("tags '{}' (seq {})", reply.query, reply.seq) };
      debug!(latest = self.seq, reason = %stale, "suggest: response ignored");
      return Err(stale);
    }
    self.applied = reply.seq;
    match reply.result {
      Ok(tags) => {
        debug!(query = %reply.query, seq = reply.seq, count = tags.len(), "suggest: applied");
        self.suggestions = tags;
        self.error = None;
      }
      Err(e) => {
        warn!(query = %reply.query, err = %e, "suggest: request failed");
        self.error = Some(e);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mutation::TagMutationCoordinator;
  use crate::testing::{FakeBackend, video};
  use tokio::time::sleep;

  const WINDOW: Duration = Duration::from_millis(200);

  fn setup() -> (Arc<FakeBackend>, Invalidator, SuggestionQuery<FakeBackend>) {
    let backend = Arc::new(FakeBackend::new(vec![
      video("v1", 1, &["cat", "catalog", "Cats"]),
      video("v2", 2, &["dog", "cat"]),
    ]));
    let invalidator = Invalidator::new(Duration::from_secs(30), 64);
    let query = SuggestionQuery::with_settings(Arc::clone(&backend), &invalidator, WINDOW, 10);
    (backend, invalidator, query)
  }

  fn names(query: &SuggestionQuery<FakeBackend>) -> Vec<&str> {
    query.suggestions().iter().map(|t| t.name.as_str()).collect()
  }

  async fn type_text(query: &mut SuggestionQuery<FakeBackend>, text: &str) {
    query.set_input(text);
    sleep(Duration::from_millis(50)).await;
    query.poll();
  }

  #[tokio::test(start_paused = true)]
  async fn burst_of_keystrokes_issues_one_request() {
    let (backend, _, mut query) = setup();
    type_text(&mut query, "c").await;
    type_text(&mut query, "ca").await;
    type_text(&mut query, "cat").await;
    assert!(backend.search_calls().is_empty());
    assert!(query.is_pending());

    sleep(WINDOW).await;
    query.poll();
    sleep(Duration::from_millis(50)).await;
    assert!(query.poll());

    assert_eq!(backend.search_calls(), vec!["cat"]);
    assert_eq!(names(&query), vec!["Cats", "cat", "catalog"]);
    assert!(!query.is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn latest_request_wins_over_late_response() {
    let (backend, _, mut query) = setup();
    backend.set_search_latency("c", Duration::from_millis(800));
    backend.set_search_latency("cat", Duration::from_millis(20));

    query.set_input("c");
    sleep(WINDOW).await;
    query.poll();
    query.set_input("cat");
    sleep(WINDOW).await;
    query.poll();

    sleep(Duration::from_millis(100)).await;
    query.poll();
    assert_eq!(names(&query), vec!["Cats", "cat", "catalog"]);

    sleep(Duration::from_secs(1)).await;
    assert!(!query.poll());
    assert_eq!(backend.search_calls(), vec!["c", "cat"]);
    assert_eq!(names(&query), vec!["Cats", "cat", "catalog"]);
  }

  #[tokio::test(start_paused = true)]
  async fn earlier_response_arriving_first_is_still_discarded() {
    let (backend, _, mut query) = setup();
    backend.set_search_latency("c", Duration::from_millis(300));
    backend.set_search_latency("cat", Duration::from_millis(500));

    query.set_input("c");
    sleep(WINDOW).await;
    query.poll();
    query.set_input("cat");
    sleep(WINDOW).await;
    query.poll();

    // "c" has resolved by now, "cat" has not
    sleep(Duration::from_millis(150)).await;
    assert!(!query.poll());
    assert!(query.suggestions().is_empty());

    sleep(Duration::from_millis(400)).await;
    assert!(query.poll());
    assert_eq!(names(&query), vec!["Cats", "cat", "catalog"]);
  }

  #[tokio::test(start_paused = true)]
  async fn blank_input_clears_without_network() {
    let (backend, _, mut query) = setup();
    query.set_input("dog");
    sleep(WINDOW).await;
    query.poll();
    sleep(Duration::from_millis(50)).await;
    query.poll();
    assert_eq!(names(&query), vec!["dog"]);
    let calls = backend.search_calls().len();

    query.set_input("   ");
    assert!(query.suggestions().is_empty());
    sleep(Duration::from_secs(1)).await;
    query.poll();
    query.set_input("");
    query.poll();

    assert_eq!(backend.search_calls().len(), calls);
    assert!(query.suggestions().is_empty());
    assert!(!query.is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn blank_input_drops_in_flight_response() {
    let (backend, _, mut query) = setup();
    backend.set_search_latency("dog", Duration::from_millis(300));
    query.set_input("dog");
    sleep(WINDOW).await;
    query.poll();

    query.clear();
    sleep(Duration::from_secs(1)).await;
    assert!(!query.poll());
    assert!(query.suggestions().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn exact_match_ignores_case_and_whitespace() {
    let (_, _, mut query) = setup();
    query.set_input("  DOG ");
    sleep(WINDOW).await;
    query.poll();
    sleep(Duration::from_millis(50)).await;
    query.poll();

    assert!(query.has_exact_match());
    assert_eq!(query.create_candidate(), None);

    query.set_input("do");
    assert!(!query.has_exact_match());
    assert_eq!(query.create_candidate(), Some("do"));

    query.clear();
    assert_eq!(query.create_candidate(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn repeated_query_is_served_from_cache() {
    let (backend, _, mut query) = setup();
    for text in ["dog", "do", "dog"] {
      query.set_input(text);
      sleep(WINDOW).await;
      query.poll();
      sleep(Duration::from_millis(50)).await;
      query.poll();
    }
    assert_eq!(backend.search_calls(), vec!["dog", "do"]);
    assert_eq!(names(&query), vec!["dog"]);
  }

  #[tokio::test(start_paused = true)]
  async fn mutation_refreshes_visible_suggestions() {
    let (backend, invalidator, mut query) = setup();
    query.set_input("dog");
    sleep(WINDOW).await;
    query.poll();
    sleep(Duration::from_millis(50)).await;
    query.poll();
    assert_eq!(query.suggestions()[0].video_count, 1);

    let coordinator = TagMutationCoordinator::new(Arc::clone(&backend), invalidator.clone());
    coordinator.add_tag("v1", "dog").await.unwrap();

    query.poll();
    sleep(Duration::from_millis(50)).await;
    assert!(query.poll());
    assert_eq!(query.suggestions()[0].video_count, 2);
    assert_eq!(backend.search_calls(), vec!["dog", "dog"]);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_request_keeps_previous_suggestions() {
    let (_, _, mut query) = setup();
    query.set_input("dog");
    sleep(WINDOW).await;
    query.poll();
    sleep(Duration::from_millis(50)).await;
    query.poll();

    let before = query.suggestions().to_vec();
    query.apply(Reply {
      seq: query.seq,
      generation: 0,
      query: "dog".to_string(),
      result: Err(ApiError::Backend { status: 500, body: String::new() }),
    })
    .unwrap();
    assert_eq!(query.suggestions(), before.as_slice());
    assert_eq!(query.error().and_then(ApiError::status), Some(500));
  }
}
