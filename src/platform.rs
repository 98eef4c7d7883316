//! Platform capabilities and the application event bus.
//!
//! Network reachability, page visibility and credential presence are read
//! through [`Platform`]; transitions between those states are broadcast on an
//! [`EventBus`] that is passed explicitly to whoever needs it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Signals broadcast across the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
  /// Network became reachable again
  Reconnected,
  /// Network became unreachable
  WentOffline,
  /// Page/window visibility changed (`true` = visible)
  VisibilityChanged(bool),
  /// The server rejected the session; every cache and queue must be wiped
  SessionUnauthorized,
  /// The user should be sent to the billing screen
  OpenBilling,
}

/// Injectable publish/subscribe channel.
///
/// Cloning yields another handle to the same bus.
#[derive(Debug, Clone)]
pub struct EventBus {
  tx: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(64);
    Self { tx }
  }

  /// Publish an event. Returns the number of subscribers that will see it.
  pub fn publish(&self, event: PlatformEvent) -> usize {
    debug!(?event, "publishing platform event");
    // No subscribers is fine
    self.tx.send(event).unwrap_or(0)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
    self.tx.subscribe()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}

/// Read-only view of the environment the client runs in.
pub trait Platform: Send + Sync {
  /// Whether the network is believed to be reachable.
  fn is_online(&self) -> bool;

  /// Whether the UI is currently visible to the user.
  fn is_visible(&self) -> bool;

  /// Whether a usable auth credential is present.
  fn has_credential(&self) -> bool;
}

/// In-memory platform whose state is flipped by hand.
///
/// Setters publish the matching [`PlatformEvent`] on the attached bus so that
/// listeners react exactly as they would to real transitions.
#[derive(Debug)]
pub struct MemoryPlatform {
  online: AtomicBool,
  visible: AtomicBool,
  credential: AtomicBool,
  bus: EventBus,
}

impl MemoryPlatform {
  /// Online, visible and authenticated.
  pub fn new(bus: EventBus) -> Self {
    Self {
      online: AtomicBool::new(true),
      visible: AtomicBool::new(true),
      credential: AtomicBool::new(true),
      bus,
    }
  }

  pub fn into_shared(self) -> Arc<Self> {
    Arc::new(self)
  }

  pub fn set_online(&self, online: bool) {
    let was = self.online.swap(online, Ordering::SeqCst);
    if was != online {
      self.bus.publish(if online {
        PlatformEvent::Reconnected
      } else {
        PlatformEvent::WentOffline
      });
    }
  }

  pub fn set_visible(&self, visible: bool) {
    let was = self.visible.swap(visible, Ordering::SeqCst);
    if was != visible {
      self.bus.publish(PlatformEvent::VisibilityChanged(visible));
    }
  }

  /// Drop or restore the credential. Dropping it broadcasts
  /// [`PlatformEvent::SessionUnauthorized`].
  pub fn set_credential(&self, present: bool) {
    let was = self.credential.swap(present, Ordering::SeqCst);
    if was && !present {
      self.bus.publish(PlatformEvent::SessionUnauthorized);
    }
  }
}

impl Platform for MemoryPlatform {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  fn is_visible(&self) -> bool {
    self.visible.load(Ordering::SeqCst)
  }

  fn has_credential(&self) -> bool {
    self.credential.load(Ordering::SeqCst)
  }
}

/// Shared handle to a platform.
pub type SharedPlatform = Arc<dyn Platform>;
