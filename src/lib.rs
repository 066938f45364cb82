//! Client-side synchronization for a tagged video catalog.
//!
//! [`FilterState`] holds the active tag filters and sort order. A
//! [`CatalogQuery`] follows it and pages through the backend, a
//! [`SuggestionQuery`] completes tag names as they are typed, and a
//! [`TagMutationCoordinator`] adds and removes tags, invalidating every cached
//! view through a shared [`Invalidator`]. The backend itself sits behind the
//! [`CatalogBackend`] trait; [`HttpBackend`] speaks its REST API.

pub mod api;
pub mod catalog;
pub mod constants;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod models;
pub mod mutation;
pub mod prefetch;
pub mod suggest;

#[cfg(test)]
pub mod testing;

pub use api::{CatalogBackend, HttpBackend, VideoQuery};
pub use catalog::{CatalogOptions, CatalogQuery, FetchStatus, Page};
pub use error::{ApiError, SyncError};
pub use filter::{FilterState, Filters, QueryKey, SortOrder};
pub use mutation::{Invalidator, TagMutationCoordinator};
pub use prefetch::{NextPage, PrefetchTrigger};
pub use suggest::SuggestionQuery;
