//! Testing utilities for the synchronization layer.
//!
//! `FakeBackend` is an in-memory catalog implementing `CatalogBackend` with a
//! call log, per-request latency, and scripted failures. Latencies are tokio
//! sleeps, so tests running with paused time stay deterministic.
//!
//! Only available when compiled with `cfg(test)`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::{CatalogBackend, VideoQuery};
use crate::error::ApiError;
use crate::filter::SortOrder;
use crate::models::{AdminStatus, ScanResult, Tag, TagList, VideoDetail, VideoPage, VideoSummary};

const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  ListVideos { page: u32, tags: Vec<String>, sort: SortOrder },
  GetVideo(String),
  SearchTags(Option<String>),
  AddTag { video_id: String, name: String },
  RemoveTag { video_id: String, tag_id: i64 },
  Rescan,
  Status,
}

#[derive(Default)]
struct FakeState {
  videos: Vec<VideoSummary>,
  tag_ids: BTreeMap<String, i64>,
  next_tag_id: i64,
  calls: Vec<Call>,
  page_latency: HashMap<u32, Duration>,
  search_latency: HashMap<String, Duration>,
  list_failures: VecDeque<u16>,
  always_has_next: bool,
}

impl FakeState {
  fn register_tag(&mut self, name: &str) {
    if !self.tag_ids.contains_key(name) {
      self.next_tag_id += 1;
      self.tag_ids.insert(name.to_string(), self.next_tag_id);
    }
  }

  fn video_mut(&mut self, video_id: &str) -> Result<&mut VideoSummary, ApiError> {
    self
      .videos
      .iter_mut()
      .find(|v| v.id == video_id)
      .ok_or_else(|| ApiError::Backend { status: 404, body: r#"{"detail":"Video not found"}"#.to_string() })
  }

  fn list(&self, query: &VideoQuery) -> VideoPage {
    let mut matching: Vec<&VideoSummary> = self
      .videos
      .iter()
      .filter(|v| !query.available_only || v.is_available)
      .filter(|v| query.tags.iter().all(|t| v.tags.contains(t)))
      .collect();
    matching.sort_by_key(|v| v.epoch);
    if query.sort == SortOrder::NewestFirst {
      matching.reverse();
    }
    let total = matching.len() as u64;
    let start = ((query.page.saturating_sub(1)) * query.page_size) as usize;
    let items: Vec<VideoSummary> =
      matching.into_iter().skip(start).take(query.page_size as usize).cloned().collect();
    let has_next = self.always_has_next || u64::from(query.page * query.page_size) < total;
    VideoPage { items, total, page: query.page, page_size: query.page_size, has_next }
  }
}

pub struct FakeBackend {
  state: Mutex<FakeState>,
}

impl FakeBackend {
  pub fn new(videos: Vec<VideoSummary>) -> Self {
    let mut state = FakeState { videos, ..FakeState::default() };
    let names: Vec<String> = state.videos.iter().flat_map(|v| v.tags.iter().cloned()).collect();
    for name in names {
      state.register_tag(&name);
    }
    Self { state: Mutex::new(state) }
  }

  /// `count` available videos `v1..=vN`, where `vN` is the newest.
  pub fn with_videos(count: usize) -> Self {
    Self::new((1..=count).map(|i| video(&format!("v{}", i), i as i64, &[])).collect())
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state.lock().unwrap().calls.clone()
  }

  pub fn list_calls(&self) -> Vec<u32> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::ListVideos { page, .. } => Some(page),
        _ => None,
      })
      .collect()
  }

  pub fn search_calls(&self) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::SearchTags(q) => Some(q.unwrap_or_default()),
        _ => None,
      })
      .collect()
  }

  pub fn set_page_latency(&self, page: u32, latency: Duration) {
    self.state.lock().unwrap().page_latency.insert(page, latency);
  }

  pub fn set_search_latency(&self, q: &str, latency: Duration) {
    self.state.lock().unwrap().search_latency.insert(q.to_string(), latency);
  }

  /// The next list calls fail with these statuses, one per call.
  pub fn fail_list_with(&self, statuses: &[u16]) {
    self.state.lock().unwrap().list_failures.extend(statuses);
  }

  /// Report a continuation on every page, even past the end.
  pub fn always_report_next(&self) {
    self.state.lock().unwrap().always_has_next = true;
  }

  /// Drop a tag from the tag registry while leaving it on videos, as if it
  /// was deleted concurrently.
  pub fn forget_tag(&self, name: &str) {
    self.state.lock().unwrap().tag_ids.remove(name);
  }

  pub fn tags_of(&self, video_id: &str) -> Vec<String> {
    let state = self.state.lock().unwrap();
    state.videos.iter().find(|v| v.id == video_id).map(|v| v.tags.clone()).unwrap_or_default()
  }
}

impl CatalogBackend for FakeBackend {
  async fn list_videos(&self, query: &VideoQuery) -> Result<VideoPage, ApiError> {
    let (latency, outcome) = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::ListVideos { page: query.page, tags: query.tags.clone(), sort: query.sort });
      let latency = state.page_latency.get(&query.page).copied().unwrap_or(DEFAULT_LATENCY);
      let outcome = match state.list_failures.pop_front() {
        Some(status) => Err(ApiError::Backend { status, body: "boom".to_string() }),
        None => Ok(state.list(query)),
      };
      (latency, outcome)
    };
    tokio::time::sleep(latency).await;
    outcome
  }

  async fn get_video(&self, video_id: &str) -> Result<VideoDetail, ApiError> {
    let outcome = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::GetVideo(video_id.to_string()));
      state.video_mut(video_id).map(|v| VideoDetail { summary: v.clone(), description: None })
    };
    tokio::time::sleep(DEFAULT_LATENCY).await;
    outcome
  }

  async fn search_tags(&self, q: Option<&str>, limit: usize) -> Result<Vec<Tag>, ApiError> {
    let (latency, tags) = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::SearchTags(q.map(str::to_string)));
      let needle = q.unwrap_or_default().to_lowercase();
      let tags: Vec<Tag> = state
        .tag_ids
        .iter()
        .filter(|(name, _)| name.to_lowercase().contains(&needle))
        .take(limit)
        .map(|(name, id)| Tag {
          id: *id,
          name: name.clone(),
          video_count: state.videos.iter().filter(|v| v.tags.contains(name)).count() as u64,
        })
        .collect();
      let latency = q.and_then(|q| state.search_latency.get(q).copied()).unwrap_or(DEFAULT_LATENCY);
      (latency, tags)
    };
    tokio::time::sleep(latency).await;
    Ok(tags)
  }

  async fn add_tag(&self, video_id: &str, name: &str) -> Result<TagList, ApiError> {
    let outcome = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::AddTag { video_id: video_id.to_string(), name: name.to_string() });
      match state.video_mut(video_id) {
        Ok(video) => {
          if !video.tags.iter().any(|t| t == name) {
            video.tags.push(name.to_string());
          }
          let tags = video.tags.clone();
          state.register_tag(name);
          Ok(TagList { tags })
        }
        Err(e) => Err(e),
      }
    };
    tokio::time::sleep(DEFAULT_LATENCY).await;
    outcome
  }

  async fn remove_tag(&self, video_id: &str, tag_id: i64) -> Result<TagList, ApiError> {
    let outcome = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::RemoveTag { video_id: video_id.to_string(), tag_id });
      let name = state.tag_ids.iter().find(|(_, id)| **id == tag_id).map(|(name, _)| name.clone());
      match (name, state.video_mut(video_id)) {
        (Some(name), Ok(video)) => {
          video.tags.retain(|t| *t != name);
          Ok(TagList { tags: video.tags.clone() })
        }
        (None, _) => Err(ApiError::Backend { status: 404, body: r#"{"detail":"Tag not found"}"#.to_string() }),
        (_, Err(e)) => Err(e),
      }
    };
    tokio::time::sleep(DEFAULT_LATENCY).await;
    outcome
  }

  async fn rescan(&self) -> Result<ScanResult, ApiError> {
    let total = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::Rescan);
      state.videos.len() as u64
    };
    tokio::time::sleep(DEFAULT_LATENCY).await;
    Ok(ScanResult { added: 0, updated: 0, marked_unavailable: 0, total, duration_seconds: 0.5 })
  }

  async fn status(&self) -> Result<AdminStatus, ApiError> {
    let status = {
      let mut state = self.state.lock().unwrap();
      state.calls.push(Call::Status);
      AdminStatus {
        total_videos: state.videos.len() as u64,
        available_videos: state.videos.iter().filter(|v| v.is_available).count() as u64,
        total_tags: state.tag_ids.len() as u64,
        video_dir: "/videos".to_string(),
        database_url: "sqlite://:memory:".to_string(),
      }
    };
    tokio::time::sleep(DEFAULT_LATENCY).await;
    Ok(status)
  }
}

/// An available video with the given id, epoch, and tags.
pub fn video(id: &str, epoch: i64, tags: &[&str]) -> VideoSummary {
  VideoSummary {
    id: id.to_string(),
    folder_name: format!("folder-{}", id),
    title: Some(format!("Video {}", id)),
    uploader: None,
    uploader_url: None,
    webpage_url: None,
    thumbnail: None,
    duration: Some(30.0),
    width: None,
    height: None,
    aspect_ratio: None,
    like_count: None,
    repost_count: None,
    comment_count: None,
    extractor: None,
    post_timestamp: None,
    epoch: Some(epoch),
    is_available: true,
    tags: tags.iter().map(|t| t.to_string()).collect(),
  }
}

/// Ids of the given videos, in order.
pub fn ids(videos: &[VideoSummary]) -> Vec<&str> {
  videos.iter().map(|v| v.id.as_str()).collect()
}
