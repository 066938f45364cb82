//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! with no runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub default_api_url: String,
  pub request_timeout_secs: u64,

  // Catalog pagination
  pub page_size: u32,
  pub stale_after_secs: u64,
  pub max_cached_keys: usize,
  pub retry_delay_ms: u64,

  // Tag suggestions
  pub debounce_ms: u64,
  pub suggestion_limit: usize,
  pub lookup_limit: usize,
  pub tag_cache_ttl_secs: u64,
  pub tag_cache_capacity: u64,

  // Browser
  pub prefetch_margin: usize,
  pub tick_ms: u64,
}

impl Constants {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms)
  }

  pub fn stale_after(&self) -> Duration {
    Duration::from_secs(self.stale_after_secs)
  }

  pub fn tag_cache_ttl(&self) -> Duration {
    Duration::from_secs(self.tag_cache_ttl_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.page_size, 24);
    assert_eq!(c.debounce(), Duration::from_millis(200));
    assert_eq!(c.stale_after(), Duration::from_secs(60));
    assert!(c.suggestion_limit <= c.lookup_limit);
  }
}
