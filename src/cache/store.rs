//! In-memory keyed store with freshness checks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::SharedClock;

/// Default time-to-live for cached payloads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached payload and the instant it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
  pub key: String,
  pub payload: T,
  pub fetched_at: Instant,
}

/// Keyed cache. Last write wins per key.
pub struct CacheStore<T> {
  entries: Mutex<HashMap<String, CacheEntry<T>>>,
  clock: SharedClock,
  ttl: Duration,
}

impl<T: Clone> CacheStore<T> {
  pub fn new(clock: SharedClock) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
      ttl: DEFAULT_TTL,
    }
  }

  /// Set the default TTL used by [`CacheStore::is_fresh`].
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
    self.entries().get(key).cloned()
  }

  /// Store `payload` under `key`, stamping it with the current instant.
  pub fn set(&self, key: &str, payload: T) {
    let entry = CacheEntry {
      key: key.to_string(),
      payload,
      fetched_at: self.clock.now(),
    };
    self.entries().insert(key.to_string(), entry);
  }

  /// Fresh iff an entry exists and `now - fetched_at < ttl`.
  pub fn is_fresh(&self, key: &str) -> bool {
    self.is_fresh_within(key, self.ttl)
  }

  pub fn is_fresh_within(&self, key: &str, ttl: Duration) -> bool {
    let now = self.clock.now();
    self
      .entries()
      .get(key)
      .is_some_and(|entry| now.saturating_duration_since(entry.fetched_at) < ttl)
  }

  pub fn invalidate(&self, key: &str) {
    self.entries().remove(key);
  }

  pub fn invalidate_all(&self) {
    self.entries().clear();
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }
}
