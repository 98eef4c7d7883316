//! Resource synchronizers: cached, breaker-guarded views over the study API.

mod billing;
mod decks;
mod progress;
mod state;
mod watcher;

pub use billing::BillingStatusCache;
pub use decks::DeckSynchronizer;
pub use progress::ProgressSynchronizer;
pub use state::SyncState;
pub use watcher::{spawn_session_watcher, Invalidate};

use std::time::Duration;

use crate::cache::{CacheLayer, CacheStore, RetryGuard, DEFAULT_TTL, MAX_RETRY_ATTEMPTS};
use crate::clock::SharedClock;
use crate::platform::SharedPlatform;

/// Everything a synchronizer needs besides its backend.
#[derive(Clone)]
pub struct SyncContext {
  pub platform: SharedPlatform,
  pub clock: SharedClock,
  pub ttl: Duration,
  pub max_retry_attempts: u32,
}

impl SyncContext {
  pub fn new(platform: SharedPlatform, clock: SharedClock) -> Self {
    Self {
      platform,
      clock,
      ttl: DEFAULT_TTL,
      max_retry_attempts: MAX_RETRY_ATTEMPTS,
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
    self.max_retry_attempts = attempts;
    self
  }

  /// A fresh cache layer configured from this context.
  pub(crate) fn layer<T: Clone + Send + Sync + 'static>(&self) -> CacheLayer<T> {
    let store = CacheStore::new(self.clock.clone()).with_ttl(self.ttl);
    let guard = RetryGuard::new(self.platform.clone(), self.clock.clone())
      .with_max_attempts(self.max_retry_attempts)
      .with_cooldown(self.ttl);
    CacheLayer::new(store, guard)
  }
}
