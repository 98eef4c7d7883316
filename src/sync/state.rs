use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

use crate::error::SyncError;

/// Loading flag and last user-facing error of a synchronizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
  pub loading: bool,
  pub error: Option<String>,
}

/// Shared, synchronously readable [`SyncState`].
#[derive(Debug, Default)]
pub(crate) struct StateCell {
  inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
  active: u32,
  error: Option<String>,
}

impl StateCell {
  fn inner(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn begin(&self) {
    self.inner().active += 1;
  }

  /// Record the outcome of an operation started with [`StateCell::begin`].
  ///
  /// Unauthorized failures never reach the error state.
  pub fn finish<T>(&self, result: &Result<T, SyncError>) {
    let mut inner = self.inner();
    inner.active = inner.active.saturating_sub(1);
    match result {
      Ok(_) => inner.error = None,
      Err(e) if e.is_user_facing() => {
        warn!(error = %e, "sync operation failed");
        inner.error = Some(e.to_string());
      }
      Err(_) => {}
    }
  }

  pub fn clear_error(&self) {
    self.inner().error = None;
  }

  pub fn snapshot(&self) -> SyncState {
    let inner = self.inner();
    SyncState {
      loading: inner.active > 0,
      error: inner.error.clone(),
    }
  }
}
