use std::sync::Arc;
use tracing::{debug, info};

use crate::api::types::{Dashboard, DeckProgress, ReviewLog, ReviewOutcome};
use crate::api::Backend;
use crate::cache::{CacheKey, CacheLayer};
use crate::error::SyncError;

use super::state::{StateCell, SyncState};
use super::watcher::Invalidate;
use super::SyncContext;

/// Cached views over review data: per deck, across all decks, and the
/// dashboard.
///
/// The three views overlap, so anything that changes review data must drop
/// all of them together.
pub struct ProgressSynchronizer {
  backend: Arc<dyn Backend>,
  all: CacheLayer<Vec<DeckProgress>>,
  decks: CacheLayer<DeckProgress>,
  dashboard: CacheLayer<Dashboard>,
  state: StateCell,
}

impl ProgressSynchronizer {
  pub fn new(backend: Arc<dyn Backend>, ctx: &SyncContext) -> Self {
    Self {
      backend,
      all: ctx.layer(),
      decks: ctx.layer(),
      dashboard: ctx.layer(),
      state: StateCell::default(),
    }
  }

  pub fn state(&self) -> SyncState {
    self.state.snapshot()
  }

  /// Progress for every deck (`__all__`).
  pub async fn fetch_all(&self, force: bool) -> Result<Vec<DeckProgress>, SyncError> {
    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let result = self
      .all
      .fetch(&CacheKey::ProgressAll, force, move || async move {
        backend.progress_all().await
      })
      .await
      .map(|r| r.map(|r| r.data).unwrap_or_default());
    self.state.finish(&result);
    result
  }

  /// Progress for one deck (`progress:<deck_id>`).
  pub async fn fetch_deck(&self, deck_id: u64, force: bool) -> Result<DeckProgress, SyncError> {
    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let result = self
      .decks
      .fetch(&CacheKey::Progress(deck_id), force, move || async move {
        backend.deck_progress(deck_id).await
      })
      .await
      .map(|r| {
        r.map(|r| r.data).unwrap_or(DeckProgress {
          deck_id,
          ..Default::default()
        })
      });
    self.state.finish(&result);
    result
  }

  pub async fn fetch_dashboard(&self, force: bool) -> Result<Dashboard, SyncError> {
    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let result = self
      .dashboard
      .fetch(&CacheKey::Dashboard, force, move || async move {
        backend.dashboard().await
      })
      .await
      .map(|r| r.map(|r| r.data).unwrap_or_default());
    self.state.finish(&result);
    result
  }

  /// Record a card review and drop every view derived from review data.
  ///
  /// Invalidation follows the server's acceptance of the request, not the
  /// `tracking_disabled` flag it reports back.
  pub async fn log_review(&self, review: &ReviewLog) -> Result<ReviewOutcome, SyncError> {
    self.state.begin();
    let result = self.backend.log_review(review).await;
    self.state.finish(&result);
    let outcome = result?;

    if outcome.tracking_disabled {
      debug!(deck_id = review.deck_id, "server reports review tracking disabled");
    }
    self.invalidate_review_views(review.deck_id);
    info!(deck_id = review.deck_id, card_id = review.card_id, "review logged");
    Ok(outcome)
  }

  /// Drop `progress:<deck_id>`, `__all__` and `dashboard` together.
  pub fn invalidate_review_views(&self, deck_id: u64) {
    self.decks.invalidate(&CacheKey::Progress(deck_id));
    self.all.invalidate(&CacheKey::ProgressAll);
    self.dashboard.invalidate(&CacheKey::Dashboard);
  }

  /// Manual retry: close the breaker for `key`.
  pub fn reset_retry(&self, key: &CacheKey) {
    match key {
      CacheKey::ProgressAll => self.all.reset_retry(key),
      CacheKey::Dashboard => self.dashboard.reset_retry(key),
      _ => self.decks.reset_retry(key),
    }
    self.state.clear_error();
  }
}

impl Invalidate for ProgressSynchronizer {
  fn invalidate_all(&self) {
    self.all.invalidate_all();
    self.decks.invalidate_all();
    self.dashboard.invalidate_all();
    self.state.clear_error();
  }
}
