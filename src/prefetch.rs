//! Turns "the end of the list is on screen" into next-page requests.

use tracing::debug;

/// Something that can load one more page.
pub trait NextPage {
  fn has_next_page(&self) -> bool;

  /// Returns whether a request was issued.
  fn request_next_page(&mut self) -> bool;
}

/// Edge-triggered prefetch for a sentinel at the end of a list.
///
/// Each not-visible → visible transition requests one page. While the
/// sentinel stays visible nothing more is requested; it has to leave the
/// viewport first. When the source has no next page the visible report is
/// ignored without consuming the edge, so a later continuation (for example
/// after a refresh) is picked up on the next report.
#[derive(Debug)]
pub struct PrefetchTrigger {
  armed: bool,
  attached: bool,
}

impl PrefetchTrigger {
  pub fn new() -> Self {
    Self { armed: true, attached: true }
  }

  /// Report the sentinel's current visibility. Returns whether a page was requested.
  pub fn observe<S: NextPage + ?Sized>(&mut self, visible: bool, source: &mut S) -> bool {
    if !self.attached {
      return false;
    }
    if !visible {
      self.armed = true;
      return false;
    }
    if !self.armed || !source.has_next_page() {
      return false;
    }
    self.armed = false;
    let issued = source.request_next_page();
    debug!(issued, "prefetch: sentinel became visible");
    issued
  }

  /// Stop reacting to visibility; used when the owning view goes away.
  pub fn detach(&mut self) {
    self.attached = false;
  }

  pub fn is_attached(&self) -> bool {
    self.attached
  }
}

impl Default for PrefetchTrigger {
  fn default() -> Self {
    Self::new()
  }
}
