use async_trait::async_trait;

use crate::error::SyncError;

use super::types::{
  AnswerResult, AnswerSubmission, BillingStatus, Dashboard, Deck, DeckPage, DeckProgress,
  DeckQuery, GeneratedQuiz, NewDeck, QuizRequest, QuizResult, ReviewLog, ReviewOutcome,
};

/// The study API as seen by the sync and quiz layers.
///
/// Implementations report HTTP 401 as [`SyncError::Unauthorized`], other
/// HTTP failures as [`SyncError::Api`] and transport failures as
/// [`SyncError::Network`].
#[async_trait]
pub trait Backend: Send + Sync {
  /// List decks; `None` reads the unparameterised list
  async fn list_decks(&self, query: Option<&DeckQuery>) -> Result<DeckPage, SyncError>;

  async fn get_deck(&self, id: u64) -> Result<Deck, SyncError>;

  async fn create_deck(&self, deck: &NewDeck) -> Result<Deck, SyncError>;

  async fn update_deck(&self, id: u64, deck: &NewDeck) -> Result<Deck, SyncError>;

  async fn delete_deck(&self, id: u64) -> Result<(), SyncError>;

  /// Progress for every deck
  async fn progress_all(&self) -> Result<Vec<DeckProgress>, SyncError>;

  async fn deck_progress(&self, deck_id: u64) -> Result<DeckProgress, SyncError>;

  async fn dashboard(&self) -> Result<Dashboard, SyncError>;

  async fn log_review(&self, review: &ReviewLog) -> Result<ReviewOutcome, SyncError>;

  async fn generate_quiz(&self, request: &QuizRequest) -> Result<GeneratedQuiz, SyncError>;

  async fn submit_answer(
    &self,
    quiz_id: &str,
    submission: &AnswerSubmission,
  ) -> Result<AnswerResult, SyncError>;

  async fn complete_quiz(&self, quiz_id: &str) -> Result<QuizResult, SyncError>;

  async fn billing_status(&self) -> Result<BillingStatus, SyncError>;
}
