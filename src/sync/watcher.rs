use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::platform::{EventBus, PlatformEvent};

/// Anything holding server-derived state that must be dropped when the
/// session is revoked.
pub trait Invalidate: Send + Sync {
  /// Drop every entry and zero every retry counter.
  fn invalidate_all(&self);
}

/// Wipe every target whenever the bus reports an unauthorized session.
///
/// Runs until the bus is dropped.
pub fn spawn_session_watcher(bus: &EventBus, targets: Vec<Arc<dyn Invalidate>>) -> JoinHandle<()> {
  let mut rx = bus.subscribe();
  tokio::spawn(async move {
    loop {
      match rx.recv().await {
        Ok(PlatformEvent::SessionUnauthorized) => {
          info!(targets = targets.len(), "session unauthorized, wiping caches");
          for target in &targets {
            target.invalidate_all();
          }
        }
        Ok(_) => {}
        Err(RecvError::Lagged(skipped)) => {
          warn!(skipped, "session watcher lagged behind the event bus");
        }
        Err(RecvError::Closed) => break,
      }
    }
  })
}
