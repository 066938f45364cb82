//! Wire types exchanged with the catalog backend.

use serde::{Deserialize, Serialize};

/// A tag as the backend reports it. `id` is backend-owned and never cached
/// across lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub video_count: u64,
}

/// One catalog entry as listed in a page. `tags` reflects the backend at fetch
/// time and may lag behind a mutation until the owning page is refetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
  pub id: String,
  pub folder_name: String,
  pub title: Option<String>,
  pub uploader: Option<String>,
  pub uploader_url: Option<String>,
  pub webpage_url: Option<String>,
  pub thumbnail: Option<String>,
  pub duration: Option<f64>,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub aspect_ratio: Option<f64>,
  pub like_count: Option<u64>,
  pub repost_count: Option<u64>,
  pub comment_count: Option<u64>,
  pub extractor: Option<String>,
  pub post_timestamp: Option<i64>,
  pub epoch: Option<i64>,
  pub is_available: bool,
  #[serde(default)]
  pub tags: Vec<String>,
}

impl VideoSummary {
  /// Title to show, falling back to the folder the video was indexed from.
  pub fn display_title(&self) -> &str {
    self.title.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or(&self.folder_name)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetail {
  #[serde(flatten)]
  pub summary: VideoSummary,
  pub description: Option<String>,
}

/// Response of `GET /videos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPage {
  pub items: Vec<VideoSummary>,
  pub total: u64,
  pub page: u32,
  pub page_size: u32,
  pub has_next: bool,
}

/// Authoritative tag list returned by tag add/remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList {
  pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
  pub added: u64,
  pub updated: u64,
  pub marked_unavailable: u64,
  pub total: u64,
  pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatus {
  pub total_videos: u64,
  pub available_videos: u64,
  pub total_tags: u64,
  pub video_dir: String,
  pub database_url: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn summary_decodes_with_missing_tags() {
    let json = r#"{"id":"v1","folder_name":"2024-01-01 clip","title":null,"uploader":null,"uploader_url":null,
      "webpage_url":null,"thumbnail":null,"duration":12.5,"width":1920,"height":1080,"aspect_ratio":1.77,
      "like_count":null,"repost_count":null,"comment_count":null,"extractor":"youtube","post_timestamp":null,
      "epoch":1700000000,"is_available":true}"#;
    let video: VideoSummary = serde_json::from_str(json).unwrap();
    assert!(video.tags.is_empty());
    assert_eq!(video.display_title(), "2024-01-01 clip");
  }

  #[test]
  fn detail_flattens_summary_fields() {
    let json = r#"{"id":"v2","folder_name":"f","title":"Sunset","uploader":"me","uploader_url":null,
      "webpage_url":"https://example.com/v2","thumbnail":null,"duration":null,"width":null,"height":null,
      "aspect_ratio":null,"like_count":3,"repost_count":null,"comment_count":null,"extractor":null,
      "post_timestamp":null,"epoch":null,"is_available":false,"tags":["beach","sunset"],"description":"golden hour"}"#;
    let detail: VideoDetail = serde_json::from_str(json).unwrap();
    assert_eq!(detail.summary.display_title(), "Sunset");
    assert_eq!(detail.summary.tags, vec!["beach", "sunset"]);
    assert_eq!(detail.description.as_deref(), Some("golden hour"));
  }

  #[test]
  fn tag_defaults_missing_count() {
    let tag: Tag = serde_json::from_str(r#"{"id":4,"name":"cats"}"#).unwrap();
    assert_eq!(tag, Tag { id: 4, name: "cats".to_string(), video_count: 0 });
  }
}
