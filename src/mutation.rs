//! Tag add/remove against the backend, and invalidation of every cached view
//! the mutation could have changed.

use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::CatalogBackend;
use crate::constants::constants;
use crate::error::{ApiError, SyncError};
use crate::models::{ScanResult, Tag};

/// Tag suggestions keyed by trimmed query text.
pub type TagCache = Cache<String, Vec<Tag>>;

/// Marks every cached view stale.
///
/// Catalog queries watch the generation counter and refetch on their next read;
/// the tag suggestion cache is cleared outright.
#[derive(Clone)]
pub struct Invalidator {
  generation: Arc<watch::Sender<u64>>,
  tags: TagCache,
}

impl Invalidator {
  pub fn new(tag_ttl: Duration, tag_capacity: u64) -> Self {
    let (tx, _) = watch::channel(0);
    let tags = Cache::builder().max_capacity(tag_capacity).time_to_live(tag_ttl).build();
    Self { generation: Arc::new(tx), tags }
  }

  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.generation.subscribe()
  }

  pub fn generation(&self) -> u64 {
    *self.generation.borrow()
  }

  pub fn tag_cache(&self) -> TagCache {
    self.tags.clone()
  }

  pub fn invalidate_all(&self) {
    self.tags.invalidate_all();
    self.generation.send_modify(|g| *g += 1);
    info!(generation = self.generation(), "cache: invalidated catalog and tag views");
  }
}

impl Default for Invalidator {
  fn default() -> Self {
    Self::new(constants().tag_cache_ttl(), constants().tag_cache_capacity)
  }
}

/// Performs tag mutations and owns the authoritative per-video tag lists.
///
/// Local state changes only when the backend confirms a mutation, and is then
/// replaced wholesale by the list the backend returns. Failures propagate to
/// the caller untouched. Cloning shares the same state, so a mutation can run
/// on a background task while views keep reading.
pub struct TagMutationCoordinator<B> {
  backend: Arc<B>,
  invalidator: Invalidator,
  video_tags: Arc<StdMutex<HashMap<String, Vec<String>>>>,
  lookup_limit: usize,
}

impl<B> Clone for TagMutationCoordinator<B> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      invalidator: self.invalidator.clone(),
      video_tags: Arc::clone(&self.video_tags),
      lookup_limit: self.lookup_limit,
    }
  }
}

impl<B: CatalogBackend> TagMutationCoordinator<B> {
  pub fn new(backend: Arc<B>, invalidator: Invalidator) -> Self {
    Self { backend, invalidator, video_tags: Arc::default(), lookup_limit: constants().lookup_limit }
  }

  /// Tags last confirmed by a mutation for `video_id`, if any.
  pub fn tags_for(&self, video_id: &str) -> Option<Vec<String>> {
    self.video_tags.lock().expect("video tag mutex poisoned").get(video_id).cloned()
  }

  /// Confirmed tags for `video_id`, falling back to what a listing reported.
  pub fn tags_or(&self, video_id: &str, listed: &[String]) -> Vec<String> {
    self.tags_for(video_id).unwrap_or_else(|| listed.to_vec())
  }

  fn store(&self, video_id: &str, tags: Vec<String>) {
    self.video_tags.lock().expect("video tag mutex poisoned").insert(video_id.to_string(), tags);
  }

  /// Add `name` to `video_id`. Returns the video's tags after the change.
  /// A blank name is ignored.
  pub async fn add_tag(&self, video_id: &str, name: &str) -> Result<Option<Vec<String>>, ApiError> {
    let name = name.trim();
    if name.is_empty() {
      return Ok(None);
    }
    let result = self.backend.add_tag(video_id, name).await.inspect_err(|e| {
      warn!(video_id, tag = %name, err = %e, "tags: add failed");
    })?;
    info!(video_id, tag = %name, count = result.tags.len(), "tags: added");
    self.store(video_id, result.tags.clone());
    self.invalidator.invalidate_all();
    Ok(Some(result.tags))
  }

  /// Remove `name` from `video_id`.
  ///
  /// The backend deletes by id, so the name is resolved first. When nothing
  /// matches (the tag is already gone) no delete is sent and `Ok(None)` is
  /// returned with local state untouched.
  pub async fn remove_tag(&self, video_id: &str, name: &str) -> Result<Option<Vec<String>>, ApiError> {
    let tag_id = match self.resolve_tag_id(name).await? {
      Ok(id) => id,
      Err(miss) => {
        debug!(video_id, reason = %miss, "tags: removal skipped");
        return Ok(None);
      }
    };
    let result = self.backend.remove_tag(video_id, tag_id).await.inspect_err(|e| {
      warn!(video_id, tag = %name, tag_id, err = %e, "tags: remove failed");
    })?;
    info!(video_id, tag = %name, tag_id, "tags: removed");
    self.store(video_id, result.tags.clone());
    self.invalidator.invalidate_all();
    Ok(Some(result.tags))
  }

  /// Look `name` up fresh; ids are never reused from an earlier lookup.
  async fn resolve_tag_id(&self, name: &str) -> Result<Result<i64, SyncError>, ApiError> {
    let candidates = self.backend.search_tags(Some(name), self.lookup_limit).await?;
    let wanted = name.to_lowercase();
    Ok(
      candidates
        .into_iter()
        .find(|t| t.name.to_lowercase() == wanted)
        .map(|t| t.id)
        .ok_or_else(|| SyncError::LookupMiss { name: name.to_string() }),
    )
  }

  /// Ask the backend to rescan its video directory, then drop every cached view.
  pub async fn rescan(&self) -> Result<ScanResult, ApiError> {
    let result = self.backend.rescan().await?;
    info!(
      added = result.added,
      updated = result.updated,
      unavailable = result.marked_unavailable,
      total = result.total,
      "admin: rescan finished"
    );
    self.video_tags.lock().expect("video tag mutex poisoned").clear();
    self.invalidator.invalidate_all();
    Ok(result)
  }
}
