//! Result of a cache-layer read, with metadata about where it came from.

use std::time::Instant;

/// Data returned by [`super::CacheLayer::fetch`].
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched (if it came from the cache)
  pub fetched_at: Option<Instant>,
}

impl<T> CacheResult<T> {
  /// Fresh data from a network call this caller started.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at: None,
    }
  }

  /// Data from a network call another caller had already started.
  pub fn joined(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Joined,
      fetched_at: None,
    }
  }

  /// Data served from the store.
  pub fn from_cache(data: T, fetched_at: Instant, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      fetched_at: Some(fetched_at),
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from a network call
  Network,
  /// Result of a network call already in flight for the same key
  Joined,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, possibly stale; no network attempt was allowed
  CacheStale,
}
