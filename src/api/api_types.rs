//! Serde-deserializable types matching study API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! of the loosely shaped payloads while keeping domain types focused on
//! application needs.

use serde::{Deserialize, Deserializer};

use super::types::{Deck, DeckPage, GeneratedQuiz, Pagination, QuizQuestion, ReviewOutcome};

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Id {
    Str(String),
    Num(u64),
  }

  Ok(match Id::deserialize(deserializer)? {
    Id::Str(s) => s,
    Id::Num(n) => n.to_string(),
  })
}

// ============================================================================
// Deck list - either a bare array or `{items, pagination}`
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiDeckList {
  Paged {
    items: Vec<Deck>,
    pagination: Option<Pagination>,
  },
  Bare(Vec<Deck>),
}

impl From<ApiDeckList> for DeckPage {
  fn from(list: ApiDeckList) -> Self {
    match list {
      ApiDeckList::Paged { items, pagination } => DeckPage { items, pagination },
      ApiDeckList::Bare(items) => DeckPage {
        items,
        pagination: None,
      },
    }
  }
}

// ============================================================================
// Quiz generation
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQuestion {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(alias = "question")]
  pub prompt: String,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(default)]
  pub correct_answer: Option<String>,
  #[serde(default)]
  pub time_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQuizResponse {
  #[serde(deserialize_with = "string_or_number")]
  pub quiz_id: String,
  #[serde(default)]
  pub questions: Vec<ApiQuestion>,
  #[serde(default)]
  pub time_limit: Option<u32>,
}

impl From<ApiQuizResponse> for GeneratedQuiz {
  fn from(response: ApiQuizResponse) -> Self {
    GeneratedQuiz {
      quiz_id: response.quiz_id,
      questions: response
        .questions
        .into_iter()
        .map(|q| QuizQuestion {
          id: q.id,
          prompt: q.prompt,
          options: q.options,
          correct_answer: q.correct_answer,
          time_limit_seconds: q.time_limit,
        })
        .collect(),
      time_limit_seconds: response.time_limit,
    }
  }
}

// ============================================================================
// Review logging
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReviewResponse {
  #[serde(default)]
  pub tracking_disabled: bool,
}

impl From<ApiReviewResponse> for ReviewOutcome {
  fn from(response: ApiReviewResponse) -> Self {
    ReviewOutcome {
      tracking_disabled: response.tracking_disabled,
    }
  }
}

// ============================================================================
// Error bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

impl ApiErrorBody {
  /// Best-effort human message from a raw error body.
  pub fn message_from(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
      .ok()
      .and_then(|b| b.message.or(b.error))
      .unwrap_or_else(|| body.trim().to_string())
  }
}
