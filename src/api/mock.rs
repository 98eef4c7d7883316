//! In-memory backend for tests.
//!
//! Counts calls per endpoint and lets tests queue failures or slow responses.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::backend::Backend;
use super::types::{
  AnswerResult, AnswerSubmission, BillingStatus, Dashboard, Deck, DeckPage, DeckProgress,
  DeckQuery, GeneratedQuiz, NewDeck, QuizQuestion, QuizRequest, QuizResult, ReviewLog,
  ReviewOutcome,
};
use crate::error::SyncError;

pub const CORRECT_ANSWER: &str = "Paris";

#[derive(Debug, Default)]
pub struct MockBackend {
  inner: Mutex<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
  decks: Vec<Deck>,
  progress: HashMap<u64, DeckProgress>,
  dashboard: Dashboard,
  billing: BillingStatus,
  calls: HashMap<&'static str, usize>,
  failures: HashMap<&'static str, VecDeque<SyncError>>,
  delays: HashMap<&'static str, Duration>,
  submitted: Vec<AnswerSubmission>,
  question_count: u32,
  time_limit: Option<u32>,
  question_limits: Vec<Option<u32>>,
  tracking_disabled: bool,
}

impl MockBackend {
  pub fn new() -> Self {
    Self::default()
  }

  fn inner(&self) -> MutexGuard<'_, MockInner> {
    self.inner.lock().unwrap()
  }

  pub fn with_decks(self, names: &[&str]) -> Self {
    {
      let mut inner = self.inner();
      for name in names {
        let id = inner.decks.len() as u64 + 1;
        inner.decks.push(deck(id, name));
      }
    }
    self
  }

  pub fn set_dashboard(&self, dashboard: Dashboard) {
    self.inner().dashboard = dashboard;
  }

  pub fn set_progress(&self, progress: DeckProgress) {
    self.inner().progress.insert(progress.deck_id, progress);
  }

  pub fn set_billing(&self, billing: BillingStatus) {
    self.inner().billing = billing;
  }

  pub fn set_time_limit(&self, seconds: Option<u32>) {
    self.inner().time_limit = seconds;
  }

  /// Per-question limits, by position; missing entries get none.
  pub fn set_question_limits(&self, limits: Vec<Option<u32>>) {
    self.inner().question_limits = limits;
  }

  pub fn set_tracking_disabled(&self, disabled: bool) {
    self.inner().tracking_disabled = disabled;
  }

  /// Make the next call to `endpoint` fail with `error`.
  pub fn fail_next(&self, endpoint: &'static str, error: SyncError) {
    self
      .inner()
      .failures
      .entry(endpoint)
      .or_default()
      .push_back(error);
  }

  /// Delay every call to `endpoint`.
  pub fn set_delay(&self, endpoint: &'static str, delay: Duration) {
    self.inner().delays.insert(endpoint, delay);
  }

  pub fn calls(&self, endpoint: &'static str) -> usize {
    self.inner().calls.get(endpoint).copied().unwrap_or(0)
  }

  pub fn submitted(&self) -> Vec<AnswerSubmission> {
    self.inner().submitted.clone()
  }

  async fn enter(&self, endpoint: &'static str) -> Result<(), SyncError> {
    let (failure, delay) = {
      let mut inner = self.inner();
      *inner.calls.entry(endpoint).or_default() += 1;
      let failure = inner
        .failures
        .get_mut(endpoint)
        .and_then(|queue| queue.pop_front());
      (failure, inner.delays.get(endpoint).copied())
    };
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    match failure {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }
}

fn deck(id: u64, name: &str) -> Deck {
  Deck {
    id,
    name: name.to_string(),
    description: None,
    card_count: 10,
    updated_at: None,
  }
}

#[async_trait]
impl Backend for MockBackend {
  async fn list_decks(&self, query: Option<&DeckQuery>) -> Result<DeckPage, SyncError> {
    self.enter("list_decks").await?;
    let inner = self.inner();
    let items: Vec<Deck> = inner
      .decks
      .iter()
      .filter(|d| {
        query
          .and_then(|q| q.search.as_deref())
          .map_or(true, |s| d.name.to_lowercase().contains(&s.to_lowercase()))
      })
      .cloned()
      .collect();
    Ok(DeckPage {
      items,
      pagination: None,
    })
  }

  async fn get_deck(&self, id: u64) -> Result<Deck, SyncError> {
    self.enter("get_deck").await?;
    self
      .inner()
      .decks
      .iter()
      .find(|d| d.id == id)
      .cloned()
      .ok_or_else(|| SyncError::from_status(404, "deck not found"))
  }

  async fn create_deck(&self, new: &NewDeck) -> Result<Deck, SyncError> {
    self.enter("create_deck").await?;
    let mut inner = self.inner();
    let id = inner.decks.iter().map(|d| d.id).max().unwrap_or(0) + 1;
    let created = deck(id, &new.name);
    inner.decks.push(created.clone());
    Ok(created)
  }

  async fn update_deck(&self, id: u64, update: &NewDeck) -> Result<Deck, SyncError> {
    self.enter("update_deck").await?;
    let mut inner = self.inner();
    let existing = inner
      .decks
      .iter_mut()
      .find(|d| d.id == id)
      .ok_or_else(|| SyncError::from_status(404, "deck not found"))?;
    existing.name = update.name.clone();
    existing.description = update.description.clone();
    Ok(existing.clone())
  }

  async fn delete_deck(&self, id: u64) -> Result<(), SyncError> {
    self.enter("delete_deck").await?;
    self.inner().decks.retain(|d| d.id != id);
    Ok(())
  }

  async fn progress_all(&self) -> Result<Vec<DeckProgress>, SyncError> {
    self.enter("progress_all").await?;
    let mut all: Vec<DeckProgress> = self.inner().progress.values().cloned().collect();
    all.sort_by_key(|p| p.deck_id);
    Ok(all)
  }

  async fn deck_progress(&self, deck_id: u64) -> Result<DeckProgress, SyncError> {
    self.enter("deck_progress").await?;
    Ok(
      self
        .inner()
        .progress
        .get(&deck_id)
        .cloned()
        .unwrap_or(DeckProgress {
          deck_id,
          ..Default::default()
        }),
    )
  }

  async fn dashboard(&self) -> Result<Dashboard, SyncError> {
    self.enter("dashboard").await?;
    Ok(self.inner().dashboard.clone())
  }

  async fn log_review(&self, review: &ReviewLog) -> Result<ReviewOutcome, SyncError> {
    self.enter("log_review").await?;
    let mut inner = self.inner();
    let tracking_disabled = inner.tracking_disabled;
    if !tracking_disabled {
      inner.dashboard.reviews_today += 1;
      let progress = inner.progress.entry(review.deck_id).or_insert(DeckProgress {
        deck_id: review.deck_id,
        ..Default::default()
      });
      progress.cards_studied += 1;
    }
    Ok(ReviewOutcome { tracking_disabled })
  }

  async fn generate_quiz(&self, request: &QuizRequest) -> Result<GeneratedQuiz, SyncError> {
    self.enter("generate_quiz").await?;
    let mut inner = self.inner();
    inner.question_count = request.question_count;
    inner.submitted.clear();
    let questions = (1..=request.question_count)
      .map(|i| QuizQuestion {
        id: format!("q{}", i),
        prompt: format!("Question {}", i),
        options: vec![
          CORRECT_ANSWER.to_string(),
          "Rome".to_string(),
          "Madrid".to_string(),
          "Berlin".to_string(),
        ],
        correct_answer: None,
        time_limit_seconds: inner.question_limits.get(i as usize - 1).copied().flatten(),
      })
      .collect();
    Ok(GeneratedQuiz {
      quiz_id: "quiz-1".to_string(),
      questions,
      time_limit_seconds: inner.time_limit,
    })
  }

  async fn submit_answer(
    &self,
    _quiz_id: &str,
    submission: &AnswerSubmission,
  ) -> Result<AnswerResult, SyncError> {
    self.enter("submit_answer").await?;
    self.inner().submitted.push(submission.clone());
    let is_correct = submission.user_answer == CORRECT_ANSWER;
    Ok(AnswerResult {
      is_correct,
      correct_answer: CORRECT_ANSWER.to_string(),
      feedback: (!is_correct).then(|| format!("The answer is {}", CORRECT_ANSWER)),
    })
  }

  async fn complete_quiz(&self, _quiz_id: &str) -> Result<QuizResult, SyncError> {
    self.enter("complete_quiz").await?;
    let inner = self.inner();
    let mut seen = std::collections::HashSet::new();
    let mut correct = 0;
    let mut time_taken = 0;
    for answer in &inner.submitted {
      if seen.insert(answer.answer_id.clone()) {
        time_taken += answer.time_spent_seconds;
        if answer.user_answer == CORRECT_ANSWER {
          correct += 1;
        }
      }
    }
    Ok(QuizResult {
      total_questions: inner.question_count,
      correct_answers: correct,
      time_taken,
    })
  }

  async fn billing_status(&self) -> Result<BillingStatus, SyncError> {
    self.enter("billing_status").await?;
    Ok(self.inner().billing.clone())
  }
}
