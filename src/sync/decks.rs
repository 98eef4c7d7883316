use std::sync::Arc;
use tracing::{info, warn};

use crate::api::types::{Deck, DeckPage, DeckQuery, NewDeck};
use crate::api::Backend;
use crate::cache::{CacheKey, CacheLayer};
use crate::error::SyncError;

use super::state::{StateCell, SyncState};
use super::watcher::Invalidate;
use super::SyncContext;

/// Cached view of the deck collection.
///
/// Reads go through the cache layer; mutations always end with a forced
/// re-fetch of the deck list instead of patching it locally.
pub struct DeckSynchronizer {
  backend: Arc<dyn Backend>,
  lists: CacheLayer<DeckPage>,
  decks: CacheLayer<Deck>,
  state: StateCell,
}

impl DeckSynchronizer {
  pub fn new(backend: Arc<dyn Backend>, ctx: &SyncContext) -> Self {
    Self {
      backend,
      lists: ctx.layer(),
      decks: ctx.layer(),
      state: StateCell::default(),
    }
  }

  pub fn state(&self) -> SyncState {
    self.state.snapshot()
  }

  /// Every deck.
  pub async fn fetch_all(&self, force: bool) -> Result<Vec<Deck>, SyncError> {
    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let result = self
      .lists
      .fetch(&CacheKey::DeckList, force, move || async move {
        backend.list_decks(None).await
      })
      .await
      .map(|r| r.map(|r| r.data.items).unwrap_or_default());
    self.state.finish(&result);
    result
  }

  /// One page of decks.
  pub async fn fetch_page(&self, query: &DeckQuery, force: bool) -> Result<DeckPage, SyncError> {
    let key = CacheKey::DeckPage {
      page: query.page,
      per_page: query.per_page,
      search: query.search.clone(),
    };

    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let query = query.clone();
    let result = self
      .lists
      .fetch(&key, force, move || async move {
        backend.list_decks(Some(&query)).await
      })
      .await
      .map(|r| r.map(|r| r.data).unwrap_or_default());
    self.state.finish(&result);
    result
  }

  /// A single deck; `None` when it is unknown and cannot be fetched right now.
  pub async fn fetch_deck(&self, id: u64, force: bool) -> Result<Option<Deck>, SyncError> {
    self.state.begin();
    let backend = Arc::clone(&self.backend);
    let result = self
      .decks
      .fetch(&CacheKey::Deck(id), force, move || async move {
        backend.get_deck(id).await
      })
      .await
      .map(|r| r.map(|r| r.data));
    self.state.finish(&result);
    result
  }

  pub async fn create_deck(&self, deck: &NewDeck) -> Result<Deck, SyncError> {
    let created = self.mutate(self.backend.create_deck(deck)).await?;
    info!(deck_id = created.id, "deck created");
    self.refresh_after_mutation(None).await;
    Ok(created)
  }

  pub async fn update_deck(&self, id: u64, deck: &NewDeck) -> Result<Deck, SyncError> {
    let updated = self.mutate(self.backend.update_deck(id, deck)).await?;
    info!(deck_id = id, "deck updated");
    self.refresh_after_mutation(Some(id)).await;
    Ok(updated)
  }

  pub async fn delete_deck(&self, id: u64) -> Result<(), SyncError> {
    self.mutate(self.backend.delete_deck(id)).await?;
    info!(deck_id = id, "deck deleted");
    self.refresh_after_mutation(Some(id)).await;
    Ok(())
  }

  async fn mutate<T>(
    &self,
    call: impl std::future::Future<Output = Result<T, SyncError>>,
  ) -> Result<T, SyncError> {
    self.state.begin();
    let result = call.await;
    self.state.finish(&result);
    result
  }

  /// Drop every list page (and the touched deck) and re-read the full list.
  async fn refresh_after_mutation(&self, deck_id: Option<u64>) {
    if let Some(id) = deck_id {
      self.decks.invalidate(&CacheKey::Deck(id));
    }
    self.lists.invalidate_all();
    if let Err(e) = self.fetch_all(true).await {
      warn!(error = %e, "deck list refresh after mutation failed");
    }
  }

  /// Last known deck list without touching the network.
  pub fn cached_all(&self) -> Option<Vec<Deck>> {
    self.lists.peek(&CacheKey::DeckList).map(|page| page.items)
  }

  /// Manual retry: close the breaker for `key`.
  pub fn reset_retry(&self, key: &CacheKey) {
    self.lists.reset_retry(key);
    self.decks.reset_retry(key);
    self.state.clear_error();
  }
}

impl Invalidate for DeckSynchronizer {
  fn invalidate_all(&self) {
    self.lists.invalidate_all();
    self.decks.invalidate_all();
    self.state.clear_error();
  }
}
