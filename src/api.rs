use reqwest::{Client, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::constants::constants;
use crate::error::ApiError;
use crate::filter::SortOrder;
use crate::models::{AdminStatus, ScanResult, Tag, TagList, VideoDetail, VideoPage};

/// Parameters of one `GET /videos` page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoQuery {
  pub page: u32,
  pub page_size: u32,
  pub sort: SortOrder,
  pub tags: Vec<String>,
  pub available_only: bool,
}

/// The REST surface the synchronization layer consumes.
///
/// Futures are `Send` so the components can run requests on background tasks
/// and apply the results on the thread that owns the state.
pub trait CatalogBackend: Send + Sync + 'static {
  fn list_videos(&self, query: &VideoQuery) -> impl Future<Output = Result<VideoPage, ApiError>> + Send;

  fn get_video(&self, video_id: &str) -> impl Future<Output = Result<VideoDetail, ApiError>> + Send;

  /// Tags matching `q`, in backend relevance order.
  fn search_tags(&self, q: Option<&str>, limit: usize) -> impl Future<Output = Result<Vec<Tag>, ApiError>> + Send;

  fn add_tag(&self, video_id: &str, name: &str) -> impl Future<Output = Result<TagList, ApiError>> + Send;

  fn remove_tag(&self, video_id: &str, tag_id: i64) -> impl Future<Output = Result<TagList, ApiError>> + Send;

  fn rescan(&self) -> impl Future<Output = Result<ScanResult, ApiError>> + Send;

  fn status(&self) -> impl Future<Output = Result<AdminStatus, ApiError>> + Send;
}

#[derive(Serialize)]
struct TagAddRequest<'a> {
  name: &'a str,
}

/// `CatalogBackend` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
  client: Client,
  base: Url,
}

impl HttpBackend {
  /// `base_url` is the API root, e.g. `http://127.0.0.1:8000/api`.
  pub fn new(base_url: &str) -> Result<Self, ApiError> {
    let base = Url::parse(base_url).map_err(|_| ApiError::InvalidUrl(base_url.to_string()))?;
    if base.cannot_be_a_base() {
      return Err(ApiError::InvalidUrl(base_url.to_string()));
    }
    let client = Client::builder()
      .timeout(Duration::from_secs(constants().request_timeout_secs))
      .build()
      .map_err(|source| ApiError::Network { url: base_url.to_string(), source })?;
    Ok(Self { client, base })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Append path segments to the API root. Segments are percent-encoded.
  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.pop_if_empty().extend(segments);
    }
    url
  }

  fn videos_url(&self, query: &VideoQuery) -> Url {
    let mut url = self.endpoint(&["videos"]);
    {
      let mut pairs = url.query_pairs_mut();
      pairs.append_pair("page", &query.page.to_string());
      pairs.append_pair("page_size", &query.page_size.to_string());
      pairs.append_pair("sort", query.sort.as_param());
      for tag in &query.tags {
        pairs.append_pair("tags", tag);
      }
      pairs.append_pair("available_only", if query.available_only { "true" } else { "false" });
    }
    url
  }

  fn tags_url(&self, q: Option<&str>, limit: usize) -> Url {
    let mut url = self.endpoint(&["tags"]);
    {
      let mut pairs = url.query_pairs_mut();
      if let Some(q) = q.filter(|q| !q.is_empty()) {
        pairs.append_pair("q", q);
      }
      pairs.append_pair("limit", &limit.to_string());
    }
    url
  }

  /// Send `request` and decode a 2xx JSON body. Non-2xx responses keep their
  /// status and raw body.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: Url) -> Result<T, ApiError> {
    debug!(url = %url, "api: request");
    let response = request.send().await.map_err(|source| ApiError::Network { url: url.to_string(), source })?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ApiError::Backend { status: status.as_u16(), body });
    }
    let body = response.text().await.map_err(|source| ApiError::Network { url: url.to_string(), source })?;
    serde_json::from_str(&body).map_err(|source| ApiError::Decode { url: url.to_string(), source })
  }
}

impl CatalogBackend for HttpBackend {
  async fn list_videos(&self, query: &VideoQuery) -> Result<VideoPage, ApiError> {
    let url = self.videos_url(query);
    self.send(self.client.get(url.clone()), url).await
  }

  async fn get_video(&self, video_id: &str) -> Result<VideoDetail, ApiError> {
    let url = self.endpoint(&["videos", video_id]);
    self.send(self.client.get(url.clone()), url).await
  }

  async fn search_tags(&self, q: Option<&str>, limit: usize) -> Result<Vec<Tag>, ApiError> {
    let url = self.tags_url(q, limit);
    self.send(self.client.get(url.clone()), url).await
  }

  async fn add_tag(&self, video_id: &str, name: &str) -> Result<TagList, ApiError> {
    let url = self.endpoint(&["videos", video_id, "tags"]);
    self.send(self.client.post(url.clone()).json(&TagAddRequest { name }), url).await
  }

  async fn remove_tag(&self, video_id: &str, tag_id: i64) -> Result<TagList, ApiError> {
    let url = self.endpoint(&["videos", video_id, "tags", &tag_id.to_string()]);
    self.send(self.client.delete(url.clone()), url).await
  }

  async fn rescan(&self) -> Result<ScanResult, ApiError> {
    let url = self.endpoint(&["admin", "rescan"]);
    self.send(self.client.post(url.clone()), url).await
  }

  async fn status(&self) -> Result<AdminStatus, ApiError> {
    let url = self.endpoint(&["admin", "status"]);
    self.send(self.client.get(url.clone()), url).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn backend() -> HttpBackend {
    HttpBackend::new("http://localhost:8000/api").unwrap()
  }

  #[test]
  fn rejects_unusable_base_urls() {
    assert!(matches!(HttpBackend::new("not a url"), Err(ApiError::InvalidUrl(_))));
    assert!(matches!(HttpBackend::new("mailto:someone@example.com"), Err(ApiError::InvalidUrl(_))));
  }

  #[test]
  fn endpoint_appends_to_api_root() {
    assert_eq!(backend().endpoint(&["videos", "abc"]).as_str(), "http://localhost:8000/api/videos/abc");

    let trailing = HttpBackend::new("http://localhost:8000/api/").unwrap();
    assert_eq!(trailing.endpoint(&["tags"]).as_str(), "http://localhost:8000/api/tags");
  }

  #[test]
  fn endpoint_encodes_ids() {
    let url = backend().endpoint(&["videos", "a b/c", "tags"]);
    assert_eq!(url.as_str(), "http://localhost:8000/api/videos/a%20b%2Fc/tags");
  }

  #[test]
  fn videos_url_repeats_tags() {
    let query = VideoQuery {
      page: 2,
      page_size: 24,
      sort: SortOrder::OldestFirst,
      tags: vec!["beach".to_string(), "sun set".to_string()],
      available_only: true,
    };
    assert_eq!(
      backend().videos_url(&query).as_str(),
      "http://localhost:8000/api/videos?page=2&page_size=24&sort=epoch_asc&tags=beach&tags=sun+set&available_only=true"
    );
  }

  #[test]
  fn tags_url_omits_blank_query() {
    assert_eq!(backend().tags_url(None, 50).as_str(), "http://localhost:8000/api/tags?limit=50");
    assert_eq!(backend().tags_url(Some(""), 10).as_str(), "http://localhost:8000/api/tags?limit=10");
    assert_eq!(backend().tags_url(Some("cat"), 10).as_str(), "http://localhost:8000/api/tags?q=cat&limit=10");
  }
}
