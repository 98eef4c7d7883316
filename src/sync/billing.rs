use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::api::types::BillingStatus;
use crate::api::Backend;
use crate::cache::{CacheKey, CacheStore};
use crate::clock::SharedClock;
use crate::error::SyncError;

use super::watcher::Invalidate;

/// Default lifetime of a billing status read.
pub const BILLING_TTL: Duration = Duration::from_secs(60);

/// Read-through cache for the subscription status.
///
/// Single key with an explicit TTL; no breaker, since there is nothing to
/// collapse or fan out.
pub struct BillingStatusCache {
  backend: Arc<dyn Backend>,
  store: CacheStore<BillingStatus>,
}

impl BillingStatusCache {
  pub fn new(backend: Arc<dyn Backend>, clock: SharedClock) -> Self {
    Self {
      backend,
      store: CacheStore::new(clock).with_ttl(BILLING_TTL),
    }
  }

  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.store = self.store.with_ttl(ttl);
    self
  }

  pub async fn status(&self, force: bool) -> Result<BillingStatus, SyncError> {
    let key = CacheKey::BillingStatus.to_string();
    if !force && self.store.is_fresh(&key) {
      if let Some(entry) = self.store.get(&key) {
        debug!("billing status cache hit");
        return Ok(entry.payload);
      }
    }

    let status = self.backend.billing_status().await?;
    self.store.set(&key, status.clone());
    Ok(status)
  }

  pub fn invalidate(&self) {
    self.store.invalidate(&CacheKey::BillingStatus.to_string());
  }
}

impl Invalidate for BillingStatusCache {
  fn invalidate_all(&self) {
    self.store.invalidate_all();
  }
}
