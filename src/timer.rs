//! Frame-driven countdown with drift-free pause/resume.
//!
//! Remaining time is always derived from a monotonic start reference rather
//! than by summing per-frame deltas, so missed or late frames never skew it.
//! Pausing records the pause instant; resuming shifts the start reference
//! forward by the paused span.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::clock::SharedClock;

/// Suggested interval between `tick` calls when driven by a real loop.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
  Idle,
  Running,
  Paused,
  Expired,
}

/// Snapshot of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
  pub phase: TimerPhase,
  pub duration: Duration,
  pub remaining: Duration,
  pub start_reference: Option<Instant>,
  pub paused_at: Option<Instant>,
}

type ExpireHook = Box<dyn FnMut() + Send>;

pub struct CountdownTimer {
  clock: SharedClock,
  state: TimerState,
  on_expire: Option<ExpireHook>,
}

impl CountdownTimer {
  pub fn new(clock: SharedClock) -> Self {
    Self {
      clock,
      state: TimerState {
        phase: TimerPhase::Idle,
        duration: Duration::ZERO,
        remaining: Duration::ZERO,
        start_reference: None,
        paused_at: None,
      },
      on_expire: None,
    }
  }

  /// Register a callback fired once each time the countdown reaches zero.
  pub fn set_on_expire(&mut self, hook: impl FnMut() + Send + 'static) {
    self.on_expire = Some(Box::new(hook));
  }

  pub fn state(&self) -> TimerState {
    self.state
  }

  pub fn phase(&self) -> TimerPhase {
    self.state.phase
  }

  /// Remaining time as of the last `tick`, `pause` or `start`.
  pub fn remaining(&self) -> Duration {
    self.state.remaining
  }

  /// Start (or restart) a countdown of `duration`.
  ///
  /// A zero duration expires on the next `tick`.
  pub fn start(&mut self, duration: Duration) {
    self.state = TimerState {
      phase: TimerPhase::Running,
      duration,
      remaining: duration,
      start_reference: Some(self.clock.now()),
      paused_at: None,
    };
    debug!(?duration, "timer started");
  }

  /// Advance the countdown to the current instant.
  ///
  /// Returns `true` only on the frame where the timer expires.
  pub fn tick(&mut self) -> bool {
    if self.state.phase != TimerPhase::Running {
      return false;
    }
    let now = self.clock.now();
    self.state.remaining = self.remaining_at(now);
    if self.state.remaining.is_zero() {
      self.expire();
      return true;
    }
    false
  }

  /// Freeze the countdown. No-op unless running.
  pub fn pause(&mut self) {
    if self.state.phase != TimerPhase::Running {
      return;
    }
    let now = self.clock.now();
    self.state.remaining = self.remaining_at(now);
    if self.state.remaining.is_zero() {
      // Left running so the next tick reports the expiry
      return;
    }
    self.state.paused_at = Some(now);
    self.state.phase = TimerPhase::Paused;
    debug!(remaining = ?self.state.remaining, "timer paused");
  }

  /// Continue a paused countdown with exactly the time it had when paused.
  pub fn resume(&mut self) {
    if self.state.phase != TimerPhase::Paused {
      return;
    }
    let now = self.clock.now();
    if let (Some(start), Some(paused_at)) = (self.state.start_reference, self.state.paused_at) {
      self.state.start_reference = Some(start + now.saturating_duration_since(paused_at));
    }
    self.state.paused_at = None;
    self.state.phase = TimerPhase::Running;
    debug!(remaining = ?self.state.remaining, "timer resumed");
  }

  /// Stop counting but keep the last remaining value for display.
  pub fn stop(&mut self) {
    if matches!(self.state.phase, TimerPhase::Running | TimerPhase::Paused) {
      self.state.phase = TimerPhase::Idle;
      self.state.start_reference = None;
      self.state.paused_at = None;
    }
  }

  /// Back to idle with nothing on the clock.
  pub fn reset(&mut self) {
    self.state = TimerState {
      phase: TimerPhase::Idle,
      duration: Duration::ZERO,
      remaining: Duration::ZERO,
      start_reference: None,
      paused_at: None,
    };
  }

  fn remaining_at(&self, now: Instant) -> Duration {
    let elapsed = self
      .state
      .start_reference
      .map(|start| now.saturating_duration_since(start))
      .unwrap_or_default();
    // Never let remaining grow back
    self
      .state
      .duration
      .saturating_sub(elapsed)
      .min(self.state.remaining)
  }

  fn expire(&mut self) {
    self.state.remaining = Duration::ZERO;
    self.state.phase = TimerPhase::Expired;
    self.state.paused_at = None;
    debug!("timer expired");
    if let Some(hook) = self.on_expire.as_mut() {
      hook();
    }
  }
}

impl fmt::Debug for CountdownTimer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CountdownTimer")
      .field("state", &self.state)
      .field("on_expire", &self.on_expire.is_some())
      .finish()
  }
}
