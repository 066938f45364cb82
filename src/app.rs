use ratatui::widgets::ListState;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use vidshelf::constants::constants;
use vidshelf::models::{AdminStatus, ScanResult, Tag, VideoDetail, VideoSummary};
use vidshelf::{
  ApiError, CatalogBackend, CatalogOptions, CatalogQuery, FilterState, Filters, HttpBackend, Invalidator,
  PrefetchTrigger, QueryKey, SuggestionQuery, TagMutationCoordinator,
};

use crate::config::{Config, Settings};
use crate::input::TextInput;

// --- Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  /// Scrolling the catalog list.
  Browse,
  /// Detail pane for one video; its tags can be selected.
  Detail,
  /// Typing a tag name to add as a filter.
  TagSearch,
  /// Typing a tag name to attach to a video.
  TagEdit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagChange {
  Add,
  Remove,
}

pub(crate) struct MutationOutcome {
  video_id: String,
  tag: String,
  change: TagChange,
  result: Result<Option<Vec<String>>, ApiError>,
}

/// In-flight async task receivers.
#[derive(Default)]
pub(crate) struct AsyncTasks {
  pub(crate) detail_rx: Option<oneshot::Receiver<Result<VideoDetail, ApiError>>>,
  pub(crate) mutation_rx: Option<oneshot::Receiver<MutationOutcome>>,
  pub(crate) rescan_rx: Option<oneshot::Receiver<Result<ScanResult, ApiError>>>,
  pub(crate) status_rx: Option<oneshot::Receiver<Result<AdminStatus, ApiError>>>,
}

pub struct App {
  pub mode: AppMode,
  pub api_url: String,
  pub available_only: bool,
  pub filters: FilterState,
  pub catalog: CatalogQuery<HttpBackend>,
  pub list_state: ListState,
  /// Rows the list occupied at the last draw.
  pub list_rows: usize,
  /// Key whose items are currently shown; selection resets when it changes.
  shown_key: QueryKey,
  prefetch: PrefetchTrigger,
  pub tag_search: SuggestionQuery<HttpBackend>,
  pub tag_search_input: TextInput,
  pub tag_edit: SuggestionQuery<HttpBackend>,
  pub tag_edit_input: TextInput,
  /// Selection within whichever suggestion list is open.
  pub suggestion_state: ListState,
  /// Video the tag editor adds to.
  pub edit_target: Option<String>,
  coordinator: TagMutationCoordinator<HttpBackend>,
  backend: Arc<HttpBackend>,
  pub detail: Option<VideoDetail>,
  pub detail_tag_state: ListState,
  pub admin_status: Option<AdminStatus>,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  prefs: Config,
  pub(crate) tasks: AsyncTasks,
  /// When the last error was set, used for auto-dismiss after 5 seconds.
  error_time: Option<Instant>,
}

impl App {
  /// Build the client stack for `settings`. Must be called within a tokio runtime.
  pub fn new(settings: Settings, prefs: Config) -> Result<Self, ApiError> {
    let backend = Arc::new(HttpBackend::new(&settings.api_url)?);
    let filters = FilterState::new(Filters { tags: Vec::new(), sort: settings.sort_order });
    for tag in &settings.tags {
      filters.add_tag(tag);
    }
    let invalidator = Invalidator::default();
    let options = CatalogOptions { available_only: settings.available_only, ..CatalogOptions::default() };
    let catalog = CatalogQuery::new(Arc::clone(&backend), &filters, &invalidator, options);
    let shown_key = catalog.key().clone();
    let tag_search = SuggestionQuery::new(Arc::clone(&backend), &invalidator);
    let tag_edit = SuggestionQuery::new(Arc::clone(&backend), &invalidator);
    let coordinator = TagMutationCoordinator::new(Arc::clone(&backend), invalidator);

    info!(api = %settings.api_url, key = %shown_key, "app: started");

    let mut app = Self {
      mode: AppMode::Browse,
      api_url: settings.api_url,
      available_only: settings.available_only,
      filters,
      catalog,
      list_state: ListState::default(),
      list_rows: 0,
      shown_key,
      prefetch: PrefetchTrigger::new(),
      tag_search,
      tag_search_input: TextInput::default(),
      tag_edit,
      tag_edit_input: TextInput::default(),
      suggestion_state: ListState::default(),
      edit_target: None,
      coordinator,
      backend,
      detail: None,
      detail_tag_state: ListState::default(),
      admin_status: None,
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      prefs,
      tasks: AsyncTasks::default(),
      error_time: None,
    };
    app.trigger_status();
    Ok(app)
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after 5 seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(5)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  fn set_info(&mut self, msg: String) {
    self.info_message = Some(msg);
  }

  // --- Polling ---

  /// Advance every query and background task. Called once per loop iteration.
  pub fn tick(&mut self) {
    self.catalog.poll();
    self.sync_selection();
    let search_changed = self.tag_search.poll();
    let edit_changed = self.tag_edit.poll();
    if search_changed || edit_changed {
      self.clamp_suggestion_selection();
    }
    self.check_pending();
    self.expire_error();
  }

  /// How long the event loop may block before the next tick is due.
  pub fn poll_timeout(&self) -> Duration {
    let tick = Duration::from_millis(constants().tick_ms);
    [self.tag_search.next_deadline(), self.tag_edit.next_deadline()].into_iter().flatten().fold(tick, Duration::min)
  }

  /// Report the list viewport to the prefetch trigger. Called after each draw,
  /// once the list offset is known.
  pub fn observe_viewport(&mut self) {
    let visible = sentinel_visible(
      self.list_state.offset(),
      self.list_rows,
      self.catalog.items().len(),
      constants().prefetch_margin,
    );
    if self.prefetch.observe(visible, &mut self.catalog) {
      debug!(key = %self.catalog.key(), page = self.catalog.last_requested_page(), "app: prefetching next page");
    }
  }

  pub fn shutdown(&mut self) {
    self.prefetch.detach();
  }

  fn sync_selection(&mut self) {
    if *self.catalog.key() != self.shown_key {
      self.shown_key = self.catalog.key().clone();
      self.list_state = ListState::default();
    }
    let len = self.catalog.items().len();
    match self.list_state.selected() {
      _ if len == 0 => self.list_state.select(None),
      None => self.list_state.select(Some(0)),
      Some(i) if i >= len => self.list_state.select(Some(len - 1)),
      Some(_) => {}
    }
  }

  fn check_pending(&mut self) {
    if let Some(mut rx) = self.tasks.detail_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(detail) => {
              self.detail_tag_state = ListState::default();
              if !detail.summary.tags.is_empty() {
                self.detail_tag_state.select(Some(0));
              }
              self.detail = Some(detail);
              self.mode = AppMode::Detail;
            }
            Err(e) => {
              warn!(err = %e, "app: detail fetch failed");
              self.set_error(format!("Could not open video: {}", e));
            }
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.detail_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Detail task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.mutation_rx.take() {
      match rx.try_recv() {
        Ok(outcome) => {
          self.status_message = None;
          self.apply_mutation(outcome);
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.mutation_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Tag update task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.rescan_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(scan) => {
              self.set_info(format!(
                "Rescan: {} added, {} updated, {} unavailable ({} total, {:.1}s)",
                scan.added, scan.updated, scan.marked_unavailable, scan.total, scan.duration_seconds
              ));
              self.trigger_status();
            }
            Err(e) => self.set_error(format!("Rescan failed: {}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.rescan_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Rescan task failed.".to_string());
        }
      }
    }

    if let Some(mut rx) = self.tasks.status_rx.take() {
      match rx.try_recv() {
        Ok(Ok(status)) => self.admin_status = Some(status),
        Ok(Err(e)) => {
          warn!(err = %e, "app: status fetch failed");
          self.set_error(format!("Backend unavailable: {}", e));
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.tasks.status_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {}
      }
    }
  }

  fn apply_mutation(&mut self, outcome: MutationOutcome) {
    let MutationOutcome { video_id, tag, change, result } = outcome;
    match (change, result) {
      (_, Ok(Some(tags))) => {
        if let Some(detail) = self.detail.as_mut().filter(|d| d.summary.id == video_id) {
          detail.summary.tags = tags;
          clamp_list(&mut self.detail_tag_state, detail.summary.tags.len());
        }
        let verb = if change == TagChange::Add { "Added" } else { "Removed" };
        self.set_info(format!("{} tag '{}'", verb, tag));
      }
      (TagChange::Remove, Ok(None)) => self.set_info(format!("Tag '{}' was already gone", tag)),
      (TagChange::Add, Ok(None)) => {}
      (TagChange::Add, Err(e)) => self.set_error(format!("Could not add '{}': {}", tag, e)),
      (TagChange::Remove, Err(e)) => self.set_error(format!("Could not remove '{}': {}", tag, e)),
    }
  }

  // --- Catalog list ---

  pub fn selected_video(&self) -> Option<&VideoSummary> {
    self.list_state.selected().and_then(|i| self.catalog.items().get(i))
  }

  /// Tags to show for `video`, preferring what a confirmed mutation returned.
  pub fn tags_of(&self, video: &VideoSummary) -> Vec<String> {
    self.coordinator.tags_or(&video.id, &video.tags)
  }

  fn select_clamped(&mut self, target: usize) {
    let len = self.catalog.items().len();
    if len > 0 {
      self.list_state.select(Some(target.min(len - 1)));
    }
  }

  pub fn select_next(&mut self) {
    let i = self.list_state.selected().map_or(0, |i| i + 1);
    self.select_clamped(i);
  }

  pub fn select_prev(&mut self) {
    let i = self.list_state.selected().map_or(0, |i| i.saturating_sub(1));
    self.select_clamped(i);
  }

  pub fn select_page_down(&mut self) {
    let i = self.list_state.selected().unwrap_or(0) + self.list_rows.max(1);
    self.select_clamped(i);
  }

  pub fn select_page_up(&mut self) {
    let i = self.list_state.selected().unwrap_or(0).saturating_sub(self.list_rows.max(1));
    self.select_clamped(i);
  }

  pub fn select_first(&mut self) {
    self.select_clamped(0);
  }

  pub fn select_last(&mut self) {
    self.select_clamped(usize::MAX);
  }

  pub fn retry(&mut self) {
    if self.catalog.retry() {
      self.clear_error();
    }
  }

  // --- Filters ---

  pub fn toggle_sort(&mut self) {
    let order = self.filters.sort_order().toggled();
    if self.filters.set_sort_order(order) {
      self.prefs.sort_order = Some(order);
      self.prefs.save();
      self.set_info(format!("Sorted {}", order.label()));
    }
  }

  pub fn pop_filter(&mut self) {
    if let Some(tag) = self.filters.pop_tag() {
      self.set_info(format!("Removed filter '{}'", tag));
    }
  }

  pub fn clear_filters(&mut self) {
    if self.filters.clear_tags() {
      self.set_info("Cleared filters".to_string());
    }
  }

  /// Clear filters if any are active. Returns whether anything was cleared.
  pub fn clear_filters_quietly(&mut self) -> bool {
    self.filters.clear_tags()
  }

  pub fn open_tag_search(&mut self) {
    self.tag_search_input.clear();
    self.tag_search.clear();
    self.suggestion_state = ListState::default();
    self.mode = AppMode::TagSearch;
  }

  pub fn tag_search_input_changed(&mut self) {
    self.tag_search.set_input(self.tag_search_input.as_str());
    self.suggestion_state = ListState::default();
  }

  pub fn close_tag_search(&mut self) {
    self.tag_search_input.clear();
    self.tag_search.clear();
    self.mode = AppMode::Browse;
  }

  /// Add the chosen suggestion as a filter. Without a selection only an
  /// exact name match is accepted; filters always name an existing tag.
  pub fn apply_tag_search(&mut self) {
    let chosen = pick_suggestion(self.tag_search.suggestions(), self.suggestion_state.selected(), self.tag_search.input());
    let Some(name) = chosen else {
      if !self.tag_search.input().trim().is_empty() {
        self.set_error(format!("No tag named '{}'", self.tag_search.input().trim()));
      }
      return;
    };
    if !self.filters.add_tag(&name) {
      self.set_info(format!("Already filtering by '{}'", name));
    }
    self.close_tag_search();
  }

  // --- Detail ---

  pub fn open_detail(&mut self) {
    let Some(video) = self.selected_video() else { return };
    let video_id = video.id.clone();
    let backend = Arc::clone(&self.backend);
    self.clear_error();
    self.status_message = Some("Loading…".to_string());

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(backend.get_video(&video_id).await);
    });
    self.tasks.detail_rx = Some(rx);
  }

  pub fn close_detail(&mut self) {
    self.detail = None;
    self.mode = AppMode::Browse;
  }

  pub fn detail_tags(&self) -> Vec<String> {
    self.detail.as_ref().map(|d| self.tags_of(&d.summary)).unwrap_or_default()
  }

  pub fn select_detail_tag(&mut self, delta: isize) {
    let count = self.detail_tags().len();
    step_list(&mut self.detail_tag_state, count, delta);
  }

  fn selected_detail_tag(&self) -> Option<String> {
    self.detail_tag_state.selected().and_then(|i| self.detail_tags().get(i).cloned())
  }

  /// Use the selected tag of the open video as a filter and go back to the list.
  pub fn filter_by_detail_tag(&mut self) {
    let Some(tag) = self.selected_detail_tag() else { return };
    if self.filters.add_tag(&tag) {
      self.set_info(format!("Filtering by '{}'", tag));
    }
    self.close_detail();
  }

  pub fn remove_detail_tag(&mut self) {
    let (Some(detail), Some(tag)) = (self.detail.as_ref(), self.selected_detail_tag()) else { return };
    let video_id = detail.summary.id.clone();
    self.spawn_mutation(video_id, tag, TagChange::Remove);
  }

  // --- Tag editor ---

  pub fn open_tag_editor(&mut self) {
    let target = match self.mode {
      AppMode::Detail => self.detail.as_ref().map(|d| d.summary.id.clone()),
      _ => self.selected_video().map(|v| v.id.clone()),
    };
    let Some(target) = target else { return };
    self.edit_target = Some(target);
    self.tag_edit_input.clear();
    self.tag_edit.clear();
    self.suggestion_state = ListState::default();
    self.mode = AppMode::TagEdit;
  }

  pub fn tag_edit_input_changed(&mut self) {
    self.tag_edit.set_input(self.tag_edit_input.as_str());
    self.suggestion_state = ListState::default();
  }

  pub fn close_tag_editor(&mut self) {
    self.tag_edit_input.clear();
    self.tag_edit.clear();
    self.edit_target = None;
    self.mode = if self.detail.is_some() { AppMode::Detail } else { AppMode::Browse };
  }

  /// Attach the selected suggestion, or the typed name, to the edit target.
  pub fn submit_tag_edit(&mut self) {
    let Some(video_id) = self.edit_target.clone() else { return };
    let name = pick_suggestion(self.tag_edit.suggestions(), self.suggestion_state.selected(), self.tag_edit.input())
      .or_else(|| self.tag_edit.create_candidate().map(str::to_string));
    let Some(name) = name else { return };
    self.spawn_mutation(video_id, name, TagChange::Add);
    self.close_tag_editor();
  }

  pub fn select_suggestion(&mut self, delta: isize) {
    let count = self.open_suggestions().len();
    step_list(&mut self.suggestion_state, count, delta);
  }

  /// Suggestions for whichever tag input is open.
  pub fn open_suggestions(&self) -> &[Tag] {
    match self.mode {
      AppMode::TagSearch => self.tag_search.suggestions(),
      AppMode::TagEdit => self.tag_edit.suggestions(),
      _ => &[],
    }
  }

  fn clamp_suggestion_selection(&mut self) {
    let count = self.open_suggestions().len();
    clamp_list(&mut self.suggestion_state, count);
  }

  // --- Mutations ---

  fn spawn_mutation(&mut self, video_id: String, tag: String, change: TagChange) {
    if self.tasks.mutation_rx.is_some() {
      self.set_error("A tag change is still in progress.".to_string());
      return;
    }
    let coordinator = self.coordinator.clone();
    self.clear_error();
    self.status_message = Some(match change {
      TagChange::Add => format!("Adding '{}'…", tag),
      TagChange::Remove => format!("Removing '{}'…", tag),
    });

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let result = match change {
        TagChange::Add => coordinator.add_tag(&video_id, &tag).await,
        TagChange::Remove => coordinator.remove_tag(&video_id, &tag).await,
      };
      let _ = tx.send(MutationOutcome { video_id, tag, change, result });
    });
    self.tasks.mutation_rx = Some(rx);
  }

  pub fn trigger_rescan(&mut self) {
    if self.tasks.rescan_rx.is_some() {
      return;
    }
    let coordinator = self.coordinator.clone();
    self.clear_error();
    self.status_message = Some("Rescanning video directory…".to_string());

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(coordinator.rescan().await);
    });
    self.tasks.rescan_rx = Some(rx);
  }

  fn trigger_status(&mut self) {
    let backend = Arc::clone(&self.backend);
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(backend.status().await);
    });
    self.tasks.status_rx = Some(rx);
  }
}

// --- Helpers ---

/// Whether the end of the list (within `margin` rows) is inside the viewport.
pub fn sentinel_visible(offset: usize, rows: usize, len: usize, margin: usize) -> bool {
  len > 0 && rows > 0 && offset + rows + margin >= len
}

/// Name chosen from a suggestion list: the selected entry, else the entry
/// matching `typed` exactly (ignoring case and surrounding whitespace).
fn pick_suggestion(suggestions: &[Tag], selected: Option<usize>, typed: &str) -> Option<String> {
  if let Some(tag) = selected.and_then(|i| suggestions.get(i)) {
    return Some(tag.name.clone());
  }
  let needle = typed.trim().to_lowercase();
  if needle.is_empty() {
    return None;
  }
  suggestions.iter().find(|t| t.name.to_lowercase() == needle).map(|t| t.name.clone())
}

/// Move a selection by `delta` within `count` entries, without wrapping.
fn step_list(state: &mut ListState, count: usize, delta: isize) {
  if count == 0 {
    state.select(None);
    return;
  }
  let next = match state.selected() {
    None if delta < 0 => count - 1,
    None => 0,
    Some(i) => i.saturating_add_signed(delta).min(count - 1),
  };
  state.select(Some(next));
}

fn clamp_list(state: &mut ListState, count: usize) {
  match state.selected() {
    Some(_) if count == 0 => state.select(None),
    Some(i) if i >= count => state.select(Some(count - 1)),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tag(name: &str) -> Tag {
    Tag { id: 1, name: name.to_string(), video_count: 0 }
  }

  // --- sentinel_visible ---

  #[test]
  fn sentinel_visible_near_end() {
    assert!(sentinel_visible(0, 30, 24, 5));
    assert!(sentinel_visible(10, 30, 45, 5));
    assert!(!sentinel_visible(0, 30, 48, 5));
  }

  #[test]
  fn sentinel_hidden_without_items_or_rows() {
    assert!(!sentinel_visible(0, 30, 0, 5));
    assert!(!sentinel_visible(0, 0, 10, 5));
  }

  // --- pick_suggestion ---

  #[test]
  fn pick_prefers_selection() {
    let tags = vec![tag("cat"), tag("catalog")];
    assert_eq!(pick_suggestion(&tags, Some(1), "cat"), Some("catalog".to_string()));
  }

  #[test]
  fn pick_falls_back_to_exact_match() {
    let tags = vec![tag("Cats"), tag("cat")];
    assert_eq!(pick_suggestion(&tags, None, " CAT "), Some("cat".to_string()));
    assert_eq!(pick_suggestion(&tags, None, "ca"), None);
    assert_eq!(pick_suggestion(&tags, None, "  "), None);
  }

  #[test]
  fn pick_ignores_out_of_range_selection() {
    let tags = vec![tag("dog")];
    assert_eq!(pick_suggestion(&tags, Some(4), "dog"), Some("dog".to_string()));
  }

  // --- step_list / clamp_list ---

  #[test]
  fn step_list_stays_in_bounds() {
    let mut state = ListState::default();
    step_list(&mut state, 3, 1);
    assert_eq!(state.selected(), Some(0));
    step_list(&mut state, 3, 5);
    assert_eq!(state.selected(), Some(2));
    step_list(&mut state, 3, -10);
    assert_eq!(state.selected(), Some(0));
  }

  #[test]
  fn step_list_up_from_nothing_selects_last() {
    let mut state = ListState::default();
    step_list(&mut state, 4, -1);
    assert_eq!(state.selected(), Some(3));
    step_list(&mut state, 0, 1);
    assert_eq!(state.selected(), None);
  }

  #[test]
  fn clamp_list_shrinks_selection() {
    let mut state = ListState::default();
    state.select(Some(5));
    clamp_list(&mut state, 2);
    assert_eq!(state.selected(), Some(1));
    clamp_list(&mut state, 0);
    assert_eq!(state.selected(), None);
  }
}
