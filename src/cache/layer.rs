//! Cache layer that orchestrates caching logic with network fetching.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::SyncError;

use super::keys::CacheKey;
use super::result::CacheResult;
use super::retry::RetryGuard;
use super::store::CacheStore;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, SyncError>>>;

/// A fetch in progress, tagged so a late finisher can tell whether it was
/// invalidated while running.
struct InFlight<T> {
  id: u64,
  fetch: SharedFetch<T>,
}

/// Cache layer that manages caching logic and network fetching.
///
/// Sits between a synchronizer and the backend, providing stale-while-revalidate
/// reads with per-key request collapsing and a failure breaker.
pub struct CacheLayer<T> {
  store: Arc<CacheStore<T>>,
  guard: Arc<RetryGuard>,
  in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
  next_id: AtomicU64,
}

impl<T> CacheLayer<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Create a new cache layer over the given store and retry guard.
  pub fn new(store: CacheStore<T>, guard: RetryGuard) -> Self {
    Self {
      store: Arc::new(store),
      guard: Arc::new(guard),
      in_flight: Arc::new(Mutex::new(HashMap::new())),
      next_id: AtomicU64::new(0),
    }
  }

  pub fn guard(&self) -> &RetryGuard {
    &self.guard
  }

  fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight<T>>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Read `key` with a cache-first strategy.
  ///
  /// 1. Unless `force`, a fresh entry is returned without touching the network
  /// 2. A fetch already in flight for the key is joined, never duplicated
  /// 3. If the guard refuses an attempt, the last known entry (possibly stale,
  ///    possibly none) is returned without error
  /// 4. Otherwise `fetcher` runs; success is stored, failure is counted and
  ///    returned, except 401 which falls back to the cache like step 3
  pub async fn fetch<F, Fut>(
    &self,
    key: &CacheKey,
    force: bool,
    fetcher: F,
  ) -> Result<Option<CacheResult<T>>, SyncError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
  {
    let key = key.to_string();

    let (fetch, started) = {
      let mut in_flight = self.in_flight();

      if !force && self.store.is_fresh(&key) {
        if let Some(entry) = self.store.get(&key) {
          debug!(key = %key, "cache hit");
          return Ok(Some(CacheResult::from_cache(
            entry.payload,
            entry.fetched_at,
            false,
          )));
        }
      }

      if let Some(existing) = in_flight.get(&key) {
        debug!(key = %key, "joining in-flight fetch");
        (existing.fetch.clone(), false)
      } else if !self.guard.can_attempt(&key) {
        debug!(key = %key, "attempt not allowed, serving last known value");
        drop(in_flight);
        return Ok(self.last_known(&key));
      } else {
        self.guard.begin_attempt(&key);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let fetch = self.spawn_fetch(key.clone(), id, fetcher());
        in_flight.insert(
          key.clone(),
          InFlight {
            id,
            fetch: fetch.clone(),
          },
        );
        (fetch, true)
      }
    };

    match fetch.await {
      Ok(data) if started => Ok(Some(CacheResult::from_network(data))),
      Ok(data) => Ok(Some(CacheResult::joined(data))),
      Err(e) if e.is_unauthorized() => {
        info!(key = %key, "unauthorized, leaving session teardown to auth layer");
        Ok(self.last_known(&key))
      }
      Err(e) => Err(e),
    }
  }

  /// Run the fetch on its own task so it completes, and releases the key,
  /// even if every caller awaiting it goes away.
  fn spawn_fetch<Fut>(&self, key: String, id: u64, fut: Fut) -> SharedFetch<T>
  where
    Fut: Future<Output = Result<T, SyncError>> + Send + 'static,
  {
    let store = Arc::clone(&self.store);
    let guard = Arc::clone(&self.guard);
    let in_flight = Arc::clone(&self.in_flight);

    let handle = tokio::spawn(async move {
      debug!(key = %key, "fetching from network");
      let result = fut.await;

      let mut in_flight = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
      let current = in_flight.get(&key).is_some_and(|f| f.id == id);
      if current {
        in_flight.remove(&key);
        match &result {
          Ok(data) => {
            store.set(&key, data.clone());
            guard.record_success(&key);
          }
          Err(e) => guard.record_failure(&key, e),
        }
      } else {
        debug!(key = %key, "key invalidated while fetching, discarding result");
      }

      result
    });

    async move {
      handle
        .await
        .unwrap_or_else(|e| Err(SyncError::Network(format!("fetch task failed: {}", e))))
    }
    .boxed()
    .shared()
  }

  fn last_known(&self, key: &str) -> Option<CacheResult<T>> {
    let stale = !self.store.is_fresh(key);
    self
      .store
      .get(key)
      .map(|entry| CacheResult::from_cache(entry.payload, entry.fetched_at, stale))
  }

  /// Current cached value regardless of freshness.
  pub fn peek(&self, key: &CacheKey) -> Option<T> {
    self.store.get(&key.to_string()).map(|entry| entry.payload)
  }

  pub fn is_fresh(&self, key: &CacheKey) -> bool {
    self.store.is_fresh(&key.to_string())
  }

  /// Drop the entry and retry record for `key`.
  ///
  /// A fetch in flight for the key keeps running for whoever awaits it, but
  /// its result is no longer written to the store.
  pub fn invalidate(&self, key: &CacheKey) {
    let key = key.to_string();
    self.in_flight().remove(&key);
    self.store.invalidate(&key);
    self.guard.reset(&key);
  }

  /// Drop every entry and zero every retry counter.
  pub fn invalidate_all(&self) {
    self.in_flight().clear();
    self.store.invalidate_all();
    self.guard.reset_all();
  }

  /// Close the breaker for `key` without dropping its cached value.
  pub fn reset_retry(&self, key: &CacheKey) {
    self.guard.reset(&key.to_string());
  }
}
