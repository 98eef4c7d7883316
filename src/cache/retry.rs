//! Per-key failure counting and in-flight tracking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::error::SyncError;
use crate::platform::SharedPlatform;

use super::store::DEFAULT_TTL;

/// Consecutive failures after which a key stops being attempted.
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Retry bookkeeping for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRecord {
  pub key: String,
  pub attempts: u32,
  pub in_flight: bool,
  pub last_failure: Option<Instant>,
}

impl RetryRecord {
  fn new(key: &str) -> Self {
    Self {
      key: key.to_string(),
      attempts: 0,
      in_flight: false,
      last_failure: None,
    }
  }
}

/// Circuit breaker keyed by cache key.
///
/// Once a key has failed `max_attempts` times in a row it is not attempted
/// again until a success, an explicit reset, or `cooldown` has passed since
/// the last failure.
pub struct RetryGuard {
  records: Mutex<HashMap<String, RetryRecord>>,
  platform: SharedPlatform,
  clock: SharedClock,
  max_attempts: u32,
  cooldown: Duration,
}

impl RetryGuard {
  pub fn new(platform: SharedPlatform, clock: SharedClock) -> Self {
    Self {
      records: Mutex::new(HashMap::new()),
      platform,
      clock,
      max_attempts: MAX_RETRY_ATTEMPTS,
      cooldown: DEFAULT_TTL,
    }
  }

  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  fn records(&self) -> MutexGuard<'_, HashMap<String, RetryRecord>> {
    self.records.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Whether a network attempt for `key` may start now.
  ///
  /// False without a credential, while a fetch for the key is in flight, or
  /// while the breaker for the key is open.
  pub fn can_attempt(&self, key: &str) -> bool {
    if !self.platform.has_credential() {
      debug!(key, "no credential, skipping attempt");
      return false;
    }

    let now = self.clock.now();
    let mut records = self.records();
    let Some(record) = records.get_mut(key) else {
      return true;
    };

    if record.in_flight {
      return false;
    }

    if record.attempts >= self.max_attempts {
      let cooled_down = record
        .last_failure
        .is_some_and(|at| now.saturating_duration_since(at) >= self.cooldown);
      if !cooled_down {
        return false;
      }
      debug!(key, "retry window elapsed, closing breaker");
      record.attempts = 0;
    }

    true
  }

  pub fn begin_attempt(&self, key: &str) {
    self
      .records()
      .entry(key.to_string())
      .or_insert_with(|| RetryRecord::new(key))
      .in_flight = true;
  }

  pub fn record_success(&self, key: &str) {
    let mut records = self.records();
    let record = records
      .entry(key.to_string())
      .or_insert_with(|| RetryRecord::new(key));
    record.in_flight = false;
    record.attempts = 0;
    record.last_failure = None;
  }

  /// Count a failed attempt.
  ///
  /// An unauthorized failure only clears the in-flight flag: the session is
  /// being torn down and the attempt says nothing about the endpoint.
  pub fn record_failure(&self, key: &str, error: &SyncError) {
    let now = self.clock.now();
    let mut records = self.records();
    let record = records
      .entry(key.to_string())
      .or_insert_with(|| RetryRecord::new(key));
    record.in_flight = false;

    if error.is_unauthorized() {
      return;
    }

    record.attempts += 1;
    record.last_failure = Some(now);
    if record.attempts >= self.max_attempts {
      warn!(key, attempts = record.attempts, "retry limit reached, breaker open");
    } else {
      debug!(key, attempts = record.attempts, "fetch failed");
    }
  }

  pub fn record(&self, key: &str) -> Option<RetryRecord> {
    self.records().get(key).cloned()
  }

  /// Forget everything about `key`.
  pub fn reset(&self, key: &str) {
    self.records().remove(key);
  }

  /// Zero every counter.
  pub fn reset_all(&self) {
    self.records().clear();
  }
}
