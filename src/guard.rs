//! Stale-result protection for async work tied to a changing identity.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic generation counter.
///
/// Take a [`Ticket`] before starting async work; when the result arrives, apply
/// it only if the ticket is still current. A `bump` invalidates every ticket
/// issued before it.
#[derive(Debug, Clone, Default)]
pub struct Generation {
  current: Arc<AtomicU64>,
}

/// Snapshot of a [`Generation`] at the time work was started.
#[derive(Debug, Clone)]
pub struct Ticket {
  issued: u64,
  current: Arc<AtomicU64>,
}

impl Generation {
  pub fn new() -> Self {
    Self::default()
  }

  /// Ticket for the generation that is already current.
  pub fn ticket(&self) -> Ticket {
    Ticket {
      issued: self.current.load(Ordering::SeqCst),
      current: Arc::clone(&self.current),
    }
  }

  /// Invalidate every outstanding ticket.
  pub fn bump(&self) {
    self.current.fetch_add(1, Ordering::SeqCst);
  }
}

impl Ticket {
  pub fn is_current(&self) -> bool {
    self.current.load(Ordering::SeqCst) == self.issued
  }
}

/// Flag flipped on teardown; checked before applying any async result.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
  cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}
