use serde::{Deserialize, Serialize};

/// Deck summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub card_count: u32,
  #[serde(default)]
  pub updated_at: Option<String>,
}

/// Fields sent when creating or updating a deck
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeck {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Page metadata returned alongside paged deck lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
  pub page: u32,
  pub per_page: u32,
  pub total: u64,
  #[serde(default)]
  pub total_pages: u32,
}

/// A deck list, paged or not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeckPage {
  pub items: Vec<Deck>,
  pub pagination: Option<Pagination>,
}

/// Parameters for a paged deck list read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckQuery {
  pub page: u32,
  pub per_page: u32,
  pub search: Option<String>,
}

impl Default for DeckQuery {
  fn default() -> Self {
    Self {
      page: 1,
      per_page: 20,
      search: None,
    }
  }
}

/// Study progress for one deck
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckProgress {
  pub deck_id: u64,
  #[serde(default)]
  pub cards_total: u32,
  #[serde(default)]
  pub cards_studied: u32,
  #[serde(default)]
  pub cards_mastered: u32,
  #[serde(default)]
  pub due_today: u32,
  #[serde(default)]
  pub accuracy: f64,
}

/// Dashboard aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
  #[serde(default)]
  pub total_decks: u32,
  #[serde(default)]
  pub total_cards: u32,
  #[serde(default)]
  pub cards_due: u32,
  #[serde(default)]
  pub reviews_today: u32,
  #[serde(default)]
  pub streak_days: u32,
}

/// A single card review to record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
  pub deck_id: u64,
  pub card_id: u64,
  /// 1 (again) to 4 (easy)
  pub rating: u8,
  pub time_spent_seconds: u32,
}

/// Server acknowledgement of a review
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewOutcome {
  /// The server accepted the request but did not record it
  pub tracking_disabled: bool,
}

/// Request for a new quiz
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
  pub deck_ids: Vec<u64>,
  pub question_count: u32,
  pub timer_enabled: bool,
}

/// A question as delivered by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
  pub id: String,
  pub prompt: String,
  pub options: Vec<String>,
  /// Only present when the server chooses to reveal it up front
  pub correct_answer: Option<String>,
  pub time_limit_seconds: Option<u32>,
}

/// Response to a quiz generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuiz {
  pub quiz_id: String,
  pub questions: Vec<QuizQuestion>,
  pub time_limit_seconds: Option<u32>,
}

/// Answer sent to the scoring endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
  pub answer_id: String,
  pub user_answer: String,
  pub time_spent_seconds: u32,
}

/// Authoritative scoring of one answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
  pub is_correct: bool,
  pub correct_answer: String,
  #[serde(default)]
  pub feedback: Option<String>,
}

/// Authoritative totals for a finished quiz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
  pub total_questions: u32,
  pub correct_answers: u32,
  /// Seconds
  pub time_taken: u32,
}

/// Subscription status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatus {
  #[serde(default)]
  pub plan: String,
  #[serde(default)]
  pub active: bool,
  #[serde(default)]
  pub renews_at: Option<String>,
}
