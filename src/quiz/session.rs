use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use crate::api::types::{AnswerResult, AnswerSubmission, QuizQuestion, QuizResult};

/// Lifecycle of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum QuizStatus {
  #[default]
  Setup,
  Active,
  Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
  pub correct: u32,
  pub incorrect: u32,
}

/// One question and everything known about the user's answer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
  pub id: String,
  pub prompt: String,
  pub options: Vec<String>,
  pub correct_answer: Option<String>,
  pub user_answer: Option<String>,
  /// `None` until scored by the server; never changes afterwards.
  pub is_correct: Option<bool>,
  pub feedback: Option<String>,
  pub time_limit_seconds: Option<u32>,
}

impl From<QuizQuestion> for QuestionRecord {
  fn from(q: QuizQuestion) -> Self {
    Self {
      id: q.id,
      prompt: q.prompt,
      options: q.options,
      correct_answer: q.correct_answer,
      user_answer: None,
      is_correct: None,
      feedback: None,
      time_limit_seconds: q.time_limit_seconds,
    }
  }
}

impl QuestionRecord {
  pub fn is_scored(&self) -> bool {
    self.is_correct.is_some()
  }
}

/// An answer given while offline, waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
  pub answer_id: String,
  pub user_answer: String,
  pub time_spent_seconds: u32,
  pub timestamp: DateTime<Utc>,
}

impl PendingAnswer {
  pub fn submission(&self) -> AnswerSubmission {
    AnswerSubmission {
      answer_id: self.answer_id.clone(),
      user_answer: self.user_answer.clone(),
      time_spent_seconds: self.time_spent_seconds,
    }
  }
}

/// What the session was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationParams {
  pub deck_ids: Vec<u64>,
  pub question_count: u32,
  pub timer_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizSession {
  /// Server quiz id, set once generated.
  pub id: Option<String>,
  pub deck_ids: Vec<u64>,
  pub questions: Vec<QuestionRecord>,
  pub current_index: usize,
  pub score: Score,
  pub status: QuizStatus,
  pub timer_per_question: Option<Duration>,
  pub pending_answers: Vec<PendingAnswer>,
  pub generation_params: Option<GenerationParams>,
  /// Authoritative totals, present once completed.
  pub result: Option<QuizResult>,
}

impl QuizSession {
  pub fn current_question(&self) -> Option<&QuestionRecord> {
    self.questions.get(self.current_index)
  }

  pub fn question(&self, id: &str) -> Option<&QuestionRecord> {
    self.questions.iter().find(|q| q.id == id)
  }

  pub(crate) fn question_mut(&mut self, id: &str) -> Option<&mut QuestionRecord> {
    self.questions.iter_mut().find(|q| q.id == id)
  }

  pub fn has_next(&self) -> bool {
    self.current_index + 1 < self.questions.len()
  }

  pub fn answered(&self) -> usize {
    self
      .questions
      .iter()
      .filter(|q| q.user_answer.is_some())
      .count()
  }

  /// Merge an authoritative result into question `id`.
  ///
  /// The score moves only the first time a question is scored, so replaying
  /// an answer that was already scored online changes nothing. Returns whether
  /// the score changed.
  pub fn apply_result(&mut self, id: &str, result: &AnswerResult) -> bool {
    let Some(question) = self.question_mut(id) else {
      debug!(question_id = id, "result for unknown question ignored");
      return false;
    };
    if question.is_scored() {
      debug!(question_id = id, "question already scored, result ignored");
      return false;
    }

    question.is_correct = Some(result.is_correct);
    question.correct_answer = Some(result.correct_answer.clone());
    question.feedback = result.feedback.clone();
    if result.is_correct {
      self.score.correct += 1;
    } else {
      self.score.incorrect += 1;
    }
    true
  }

  /// Queue an offline answer, replacing an earlier queued answer to the same
  /// question in place.
  pub(crate) fn enqueue(&mut self, pending: PendingAnswer) {
    match self
      .pending_answers
      .iter_mut()
      .find(|p| p.answer_id == pending.answer_id)
    {
      Some(existing) => *existing = pending,
      None => self.pending_answers.push(pending),
    }
  }
}
