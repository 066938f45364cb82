//! Polled quiescence timer for coalescing bursts of input.

use std::time::Duration;
use tokio::time::Instant;

/// A restartable quiescence timer.
///
/// `arm` (re)starts the window; the timer is due once the window has passed
/// without another `arm`. Driven by polling so the owner decides when to act
/// on it, on the same thread that owns the debounced state.
#[derive(Debug, Clone)]
pub struct Debounce {
  window: Duration,
  deadline: Option<Instant>,
}

impl Debounce {
  pub fn new(window: Duration) -> Self {
    Self { window, deadline: None }
  }

  pub fn arm(&mut self) {
    self.deadline = Some(Instant::now() + self.window);
  }

  pub fn cancel(&mut self) {
    self.deadline = None;
  }

  pub fn is_armed(&self) -> bool {
    self.deadline.is_some()
  }

  /// Time left until the timer is due, if armed.
  pub fn remaining(&self) -> Option<Duration> {
    self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
  }

  /// Returns true exactly once per armed window, when it has elapsed.
  pub fn fire(&mut self) -> bool {
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => {
        self.deadline = None;
        true
      }
      _ => false,
    }
  }
}
