//! Error types for the synchronization layer.
//!
//! `ApiError` is what the backend boundary returns and what mutations propagate
//! to their caller unchanged. `SyncError` covers the internal signals raised
//! while keeping cached views consistent; neither variant is shown to users.

use thiserror::Error;

/// A failed backend call.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The request could not complete (connection refused, timeout, TLS).
  #[error("request to {url} failed: {source}")]
  Network {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The backend answered with a non-2xx status.
  #[error("API {status}: {body}")]
  Backend { status: u16, body: String },

  /// A 2xx response whose body did not match the expected shape.
  #[error("unexpected response from {url}: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid API base URL '{0}'")]
  InvalidUrl(String),
}

impl ApiError {
  /// HTTP status for backend errors.
  pub fn status(&self) -> Option<u16> {
    match self {
      ApiError::Backend { status, .. } => Some(*status),
      _ => None,
    }
  }
}

/// Internal consistency signals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
  /// A response arrived for a request that has since been superseded.
  #[error("discarded stale response for {request}")]
  StaleResponseDiscarded { request: String },

  /// Tag name to id resolution found no exact match.
  #[error("no tag named '{name}'")]
  LookupMiss { name: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backend_error_keeps_status_and_body() {
    let err = ApiError::Backend { status: 404, body: r#"{"detail":"Video not found"}"#.to_string() };
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), r#"API 404: {"detail":"Video not found"}"#);
  }

  #[test]
  fn sync_errors_render_context() {
    let miss = SyncError::LookupMiss { name: "sunset".to_string() };
    assert_eq!(miss.to_string(), "no tag named 'sunset'");
    assert_eq!(ApiError::InvalidUrl("nope".to_string()).status(), None);
  }
}
