//! Cache keys for the study API resources.

use std::fmt;

/// Identifies a cached resource together with its query parameters.
///
/// Each synchronizer owns its own store, so the deck list and the aggregate
/// progress view may both render as `__all__` without colliding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
  /// Unparameterised deck list
  DeckList,
  /// One page of the deck list
  DeckPage {
    page: u32,
    per_page: u32,
    search: Option<String>,
  },
  /// A single deck
  Deck(u64),
  /// Progress aggregated over every deck
  ProgressAll,
  /// Progress for one deck
  Progress(u64),
  /// Dashboard summary
  Dashboard,
  /// Billing/subscription status
  BillingStatus,
}

/// Key string shared by the unparameterised list views.
pub const ALL_KEY: &str = "__all__";

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DeckList | Self::ProgressAll => f.write_str(ALL_KEY),
      Self::DeckPage {
        page,
        per_page,
        search,
      } => write!(
        f,
        "decks:{}:{}:{}",
        page,
        per_page,
        search.as_deref().map(normalize_search).unwrap_or_default()
      ),
      Self::Deck(id) => write!(f, "deck:{}", id),
      Self::Progress(deck_id) => write!(f, "progress:{}", deck_id),
      Self::Dashboard => f.write_str("dashboard"),
      Self::BillingStatus => f.write_str("billing:status"),
    }
  }
}

/// Normalize search text so equivalent queries share a cache entry.
fn normalize_search(search: &str) -> String {
  search.trim().to_lowercase()
}
