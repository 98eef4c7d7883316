//! Monotonic time source shared by the cache and the countdown timer.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A source of monotonic instants.
///
/// Everything time-dependent (cache freshness, countdowns, per-question timing)
/// reads time through this trait so tests can advance it deterministically.
pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;
}

/// Clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }
}

/// Clock that only moves when told to.
///
/// Clones share the same offset, so a test can hand one clone to the component
/// under test and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
  base: Instant,
  offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
  pub fn new() -> Self {
    Self {
      base: Instant::now(),
      offset: Arc::new(Mutex::new(Duration::ZERO)),
    }
  }

  /// Move the clock forward.
  pub fn advance(&self, by: Duration) {
    let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
    *offset += by;
  }

  /// Total time advanced since creation.
  pub fn elapsed(&self) -> Duration {
    *self.offset.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock for ManualClock {
  fn now(&self) -> Instant {
    self.base + self.elapsed()
  }
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;
