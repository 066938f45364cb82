//! Tag-filter selection and sort order, plus the cache key derived from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

use crate::api::VideoQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
  #[default]
  NewestFirst,
  OldestFirst,
}

impl SortOrder {
  /// Value of the `sort` query parameter.
  pub fn as_param(self) -> &'static str {
    match self {
      SortOrder::NewestFirst => "epoch_desc",
      SortOrder::OldestFirst => "epoch_asc",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      SortOrder::NewestFirst => "newest first",
      SortOrder::OldestFirst => "oldest first",
    }
  }

  pub fn toggled(self) -> Self {
    match self {
      SortOrder::NewestFirst => SortOrder::OldestFirst,
      SortOrder::OldestFirst => SortOrder::NewestFirst,
    }
  }
}

/// A snapshot of the filter selection. `tags` keeps insertion order for chip
/// display; it never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
  pub tags: Vec<String>,
  pub sort: SortOrder,
}

impl Filters {
  pub fn key(&self, available_only: bool) -> QueryKey {
    QueryKey { sort: self.sort, tags: self.tags.iter().cloned().collect(), available_only }
  }
}

/// Identity of one filtered, sorted result stream. Tags are held as a set, so
/// selections that differ only in order address the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  sort: SortOrder,
  tags: BTreeSet<String>,
  available_only: bool,
}

impl QueryKey {
  pub fn sort(&self) -> SortOrder {
    self.sort
  }

  pub fn tags(&self) -> impl Iterator<Item = &str> {
    self.tags.iter().map(String::as_str)
  }

  pub fn to_query(&self, page: u32, page_size: u32) -> VideoQuery {
    VideoQuery {
      page,
      page_size,
      sort: self.sort,
      tags: self.tags.iter().cloned().collect(),
      available_only: self.available_only,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.sort.as_param())?;
    if !self.tags.is_empty() {
      let tags: Vec<&str> = self.tags().collect();
      write!(f, "[{}]", tags.join(","))?;
    }
    if !self.available_only {
      write!(f, "+unavailable")?;
    }
    Ok(())
  }
}

/// The single source of truth for what the catalog shows.
///
/// Built once at startup and handed to every component that depends on it.
/// Mutations update the held value immediately; subscribers observe the change
/// on their next read through the receiver returned by [`FilterState::subscribe`].
/// Calls that leave the selection unchanged do not notify.
pub struct FilterState {
  tx: watch::Sender<Filters>,
}

impl FilterState {
  pub fn new(initial: Filters) -> Self {
    let (tx, _) = watch::channel(initial);
    Self { tx }
  }

  pub fn subscribe(&self) -> watch::Receiver<Filters> {
    self.tx.subscribe()
  }

  pub fn snapshot(&self) -> Filters {
    self.tx.borrow().clone()
  }

  pub fn active_tags(&self) -> Vec<String> {
    self.tx.borrow().tags.clone()
  }

  pub fn sort_order(&self) -> SortOrder {
    self.tx.borrow().sort
  }

  pub fn contains(&self, name: &str) -> bool {
    self.tx.borrow().tags.iter().any(|t| t == name)
  }

  /// Append `name` unless it is already active. Returns whether it was added.
  pub fn add_tag(&self, name: &str) -> bool {
    let added = self.tx.send_if_modified(|f| {
      if f.tags.iter().any(|t| t == name) {
        return false;
      }
      f.tags.push(name.to_string());
      true
    });
    if added {
      debug!(tag = %name, "filters: tag added");
    }
    added
  }

  pub fn remove_tag(&self, name: &str) -> bool {
    let removed = self.tx.send_if_modified(|f| match f.tags.iter().position(|t| t == name) {
      Some(idx) => {
        f.tags.remove(idx);
        true
      }
      None => false,
    });
    if removed {
      debug!(tag = %name, "filters: tag removed");
    }
    removed
  }

  /// Remove the most recently added tag, if any.
  pub fn pop_tag(&self) -> Option<String> {
    let mut popped = None;
    self.tx.send_if_modified(|f| {
      popped = f.tags.pop();
      popped.is_some()
    });
    popped
  }

  pub fn clear_tags(&self) -> bool {
    self.tx.send_if_modified(|f| {
      if f.tags.is_empty() {
        return false;
      }
      f.tags.clear();
      true
    })
  }

  pub fn set_sort_order(&self, order: SortOrder) -> bool {
    let changed = self.tx.send_if_modified(|f| {
      if f.sort == order {
        return false;
      }
      f.sort = order;
      true
    });
    if changed {
      debug!(sort = order.as_param(), "filters: sort changed");
    }
    changed
  }
}

impl Default for FilterState {
  fn default() -> Self {
    Self::new(Filters::default())
  }
}
